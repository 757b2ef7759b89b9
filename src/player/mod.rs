pub mod controller;
pub mod playlist;
pub mod session;
pub mod transport;
