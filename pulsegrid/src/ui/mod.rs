//! UI module root: exposes drawing functions for individual panels.

pub mod header;
pub mod series;
pub mod servers;
pub mod theme;
pub mod util;
