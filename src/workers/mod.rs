pub mod pipeline;
pub mod transcoder;
