pub mod memory_directory;
pub mod simulated;

pub use memory_directory::InMemoryDirectory;
pub use simulated::SimulatedDevice;
