// Shared AppleScript plumbing for the macOS bridges
pub mod apple_common;

pub mod apple_reminders;
pub mod caldav;
