//! A small non-preemptive kernel: virtual terminals composited onto the
//! VGA text buffer, a set-1 keyboard decoder feeding per-terminal handlers,
//! and a scratchpad shell that launches full-screen applications.
//!
//! Hardware-only pieces are compiled for bare metal; everything else also
//! builds hosted so the logic can run under the regular test harness.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

pub mod app;
pub mod compositor;
pub mod constants;
#[cfg(target_os = "none")]
pub mod gdt;
pub mod isr;
pub mod keyboard;
pub mod panic;
pub mod pic;
pub mod pong;
pub mod scratchpad;
pub mod serial;
pub mod terminal;
pub mod tetris;
#[cfg(target_os = "none")]
pub mod trap;
#[cfg(target_os = "none")]
pub mod vga;
