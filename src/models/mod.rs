pub mod device_event;
pub mod employee;
pub mod punch_hint;
pub mod raw_event;
pub mod session;
pub mod sync_run;
