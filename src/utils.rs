pub mod cleanup;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod stream;
