mod approval;
mod reloader;

pub use approval::Approval;
pub use reloader::Reloader;

/// Name the controller registers under with the update-delivery channel
pub const PACKAGE_NAME: &str = "reloader";
