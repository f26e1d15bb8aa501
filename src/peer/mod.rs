// Actuator peer: decodes trigger commands and acknowledges them.
pub mod driver;
pub mod service;
