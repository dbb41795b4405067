//! Weight tracking, scheduling and snapshot publication.

pub mod controller;
pub mod load;
pub mod picker;
pub mod refresher;
pub mod tracker;
pub mod view;
