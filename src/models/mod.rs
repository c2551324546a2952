pub mod policy;
pub mod timestamps;
pub mod update;

pub use policy::*;
pub use timestamps::*;
pub use update::*;
