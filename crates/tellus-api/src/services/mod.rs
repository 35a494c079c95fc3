// Business logic between the route modules and the stores

pub mod deploy;
pub mod execute;

pub use deploy::ProcessService;
pub use execute::JobService;
