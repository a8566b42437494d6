pub mod abi;
pub mod capture;
pub mod module;
pub mod resource;
pub mod state;
