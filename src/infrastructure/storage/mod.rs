pub mod artifacts;
pub mod playlist;
