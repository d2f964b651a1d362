pub mod presence;
pub mod relay;
