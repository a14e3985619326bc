pub mod clock;
pub mod db;
pub mod push;
pub mod repos;
