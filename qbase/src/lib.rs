pub mod config;
pub mod error;
pub mod flow;
pub mod frame;
pub mod packet;
pub mod param;
pub mod role;
pub mod sid;
pub mod varint;
