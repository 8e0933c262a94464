pub mod bootstrap;
pub mod context;
pub mod restore;
pub mod run;
pub mod status;
