pub mod experiment;
pub mod logging;
pub mod services;
