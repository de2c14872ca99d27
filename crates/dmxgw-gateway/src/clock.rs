//! Wall-clock time-of-day source for the scheduler. Kept out of
//! `dmxgw-core` so the scheduler stays testable without touching the OS
//! clock — `dmxgw_core::scheduler::Scheduler::tick` takes `now` as an
//! argument for exactly this reason.

use dmxgw_core::TimeOfDay;

pub fn now() -> TimeOfDay {
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    let t = unsafe { libc::time(std::ptr::null_mut()) };
    unsafe { libc::localtime_r(&t, &mut tm) };
    TimeOfDay::from_hms(tm.tm_hour as u8, tm.tm_min as u8, tm.tm_sec as u8)
        .expect("localtime_r always yields a valid time of day")
}
