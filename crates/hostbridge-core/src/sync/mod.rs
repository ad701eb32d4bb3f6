mod shutdown;

pub use shutdown::RunFlag;
