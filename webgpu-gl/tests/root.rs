// All files containing tests
mod common;

mod buffer;
mod device;
mod encoder;
mod pipeline;
mod queue;
mod render_pass;
