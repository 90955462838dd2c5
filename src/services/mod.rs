pub mod booking;
pub mod guard;
pub mod notify;
pub mod recommend;
pub mod scoring;
pub mod slots;
