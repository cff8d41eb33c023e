pub mod init;
pub mod partitions;
pub mod plans;
pub mod tenant;
pub mod token;
pub mod trials;
