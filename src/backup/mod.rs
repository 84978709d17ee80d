pub mod checksum;
pub mod compression;
pub mod executor;
pub mod pipeline;
pub mod scheduler;
pub mod tool;

pub use compression::ZipCompressor;
pub use executor::VendorToolExecutor;
pub use pipeline::Pipeline;
pub use scheduler::run_scheduler;
