pub mod config_cmd;
pub mod device;
pub mod output;
pub mod serve;
pub mod token;
