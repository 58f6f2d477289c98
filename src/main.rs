#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod boot {
    use vtos::compositor::{CONSOLE, KERNEL_TTY};
    use vtos::pong::PONG;
    use vtos::scratchpad::SCRATCHPAD;
    use vtos::terminal::Color;
    use vtos::tetris::TETRIS;
    use vtos::{gdt, kpanic, println, serial_println, trap};

    fn register_commands() {
        let commands: [(&str, fn()); 4] = [
            ("help", help),
            ("clear", clear),
            ("tetris", || TETRIS.run()),
            ("pong", || PONG.run()),
        ];

        for (name, run) in commands {
            if SCRATCHPAD.add_command(name, run).is_err() {
                kpanic!("command table full while registering '{}'", name);
            }
        }
    }

    fn help() {
        println!("commands: help, clear, tetris, pong");
        println!("F10 triggers a kernel panic");
    }

    fn clear() {
        KERNEL_TTY.clear(Color::Black);
        CONSOLE.flush(&KERNEL_TTY);
    }

    #[no_mangle]
    pub extern "C" fn _start() -> ! {
        serial_println!("boot: segments");
        gdt::init();

        serial_println!("boot: console");
        KERNEL_TTY.initialize();
        KERNEL_TTY.set_cursor_visible(true);
        KERNEL_TTY.set_handler(&SCRATCHPAD);
        CONSOLE.set_active(&KERNEL_TTY);

        register_commands();

        println!("vtos 0.1.0");
        println!("Type 'help' for available commands.\n");
        SCRATCHPAD.render();

        // last: from here on the keyboard can fire
        serial_println!("boot: interrupts");
        trap::init();

        loop {
            x86_64::instructions::hlt();
        }
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        serial_println!("panic: {}", info);
        vtos::panic::kpanic(format_args!("{}", info))
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
