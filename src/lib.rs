pub mod consts;
pub mod discuz;
pub mod http;
pub mod provider;
pub mod result;
pub mod runner;
pub mod store;
