pub mod api;
pub mod cloud;
pub mod db;
