// Domain layer: protocol data types and the ports (interfaces) the engine talks through.

pub mod model;
pub mod ports;
