//! Demux layer — container walking and audio block extraction.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dcastream::audio::demux::demux_to_frames;
//!
//! let stats = demux_to_frames(webm_reader, &mut frame_sink)?;
//! ```
//!
//! [`ebml`] knows the element syntax and nothing about audio;
//! [`webm_opus`] picks the audio blocks out and emits DCA frames.

pub mod ebml;
pub mod webm_opus;

pub use ebml::{ElementHandler, ElementId, ElementInfo, walk};
pub use webm_opus::{DemuxStats, WebmOpusDemuxer, demux_to_frames};
