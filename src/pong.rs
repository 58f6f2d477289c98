//! Two-player pong on its own virtual terminal.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::app::{cycles, FrameThrottle, Rng};
use crate::compositor::{CONSOLE, KERNEL_TTY};
use crate::constants::vga::{VGA_HEIGHT, VGA_WIDTH};
use crate::isr;
use crate::keyboard::{Key, KeyEvent, KeyHandler};
use crate::terminal::{Color, Entry, EntryColor, Terminal};

const PADDLE_HEIGHT: usize = 5;
const PADDLE_SPEED: f32 = 0.6;
const BALL_SPEED: f32 = 0.9;

/// Cycle-counter ticks per nominal frame; `dt` is measured in frames.
const FRAME_CYCLES: u64 = 100_000_000;

const LEFT_PADDLE_X: usize = 2;
const RIGHT_PADDLE_X: usize = VGA_WIDTH - 3;

// playable band between the two wall rows
const TOP_BOUND: f32 = 1.0;
const BOTTOM_BOUND: f32 = (VGA_HEIGHT - 2) as f32;
const PADDLE_TOP_LIMIT: f32 = 1.0;
const PADDLE_BOTTOM_LIMIT: f32 = (VGA_HEIGHT - 1 - PADDLE_HEIGHT) as f32;

// the ball reflects one column in front of each paddle
const LEFT_FACE: f32 = (LEFT_PADDLE_X + 1) as f32;
const RIGHT_FACE: f32 = (RIGHT_PADDLE_X - 1) as f32;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec2f {
    x: f32,
    y: f32,
}

impl Vec2f {
    const fn new(x: f32, y: f32) -> Vec2f {
        Vec2f { x, y }
    }
}

struct Paddle {
    top: f32,
    velocity: f32,
}

impl Paddle {
    fn new() -> Paddle {
        Paddle {
            top: (VGA_HEIGHT - PADDLE_HEIGHT) as f32 / 2.0,
            velocity: 0.0,
        }
    }

    fn advance(&mut self, dt: f32) {
        self.top += self.velocity * dt;

        if self.top < PADDLE_TOP_LIMIT {
            self.top = PADDLE_TOP_LIMIT;
        } else if self.top > PADDLE_BOTTOM_LIMIT {
            self.top = PADDLE_BOTTOM_LIMIT;
        }
    }

    fn covers(&self, y: f32) -> bool {
        y >= self.top - 0.5 && y <= self.top + PADDLE_HEIGHT as f32 + 0.5
    }
}

struct Ball {
    position: Vec2f,
    velocity: Vec2f,
    /// A serving ball sits centered and motionless until Space releases it.
    serving: bool,
}

/// Copy of what one rendered frame needs, taken under the pause gate so
/// drawing never holds the state lock the keypress handler contends for
/// in interrupt context.
struct Frame {
    left_top: usize,
    right_top: usize,
    ball: (usize, usize),
    score_left: u32,
    score_right: u32,
    serving: bool,
}

struct Game {
    left: Paddle,
    right: Paddle,
    ball: Ball,
    score_left: u32,
    score_right: u32,
    rng: Rng,
}

impl Game {
    fn new(mut rng: Rng) -> Game {
        let ball = Self::fresh_ball(&mut rng);
        Game {
            left: Paddle::new(),
            right: Paddle::new(),
            ball,
            score_left: 0,
            score_right: 0,
            rng,
        }
    }

    fn fresh_ball(rng: &mut Rng) -> Ball {
        let toward_right = rng.pick(2) == 0;
        // vertical component in -0.5..=0.5 in tenth steps
        let vy = (rng.pick(11) as f32 - 5.0) / 10.0;

        Ball {
            position: Vec2f::new(
                VGA_WIDTH as f32 / 2.0,
                VGA_HEIGHT as f32 / 2.0,
            ),
            velocity: Vec2f::new(if toward_right { 1.0 } else { -1.0 }, vy),
            serving: true,
        }
    }

    fn serve(&mut self) {
        self.ball.serving = false;
    }

    fn reset_ball(&mut self) {
        self.ball = Self::fresh_ball(&mut self.rng);
    }

    /// Advances the simulation by `dt` nominal frames.
    fn update(&mut self, dt: f32) {
        self.left.advance(dt);
        self.right.advance(dt);

        if self.ball.serving {
            return;
        }

        self.ball.position.x += self.ball.velocity.x * BALL_SPEED * dt;
        self.ball.position.y += self.ball.velocity.y * BALL_SPEED * dt;

        if self.ball.position.y < TOP_BOUND {
            self.ball.position.y = TOP_BOUND;
            self.ball.velocity.y = -self.ball.velocity.y;
        } else if self.ball.position.y > BOTTOM_BOUND {
            self.ball.position.y = BOTTOM_BOUND;
            self.ball.velocity.y = -self.ball.velocity.y;
        }

        if self.ball.velocity.x < 0.0 && self.ball.position.x <= LEFT_FACE {
            if self.left.covers(self.ball.position.y) {
                self.ball.position.x = LEFT_FACE;
                self.ball.velocity.x = -self.ball.velocity.x;
                // a moving paddle drags the ball with it
                self.ball.velocity.y += self.left.velocity * 0.5;
            } else {
                self.score_right += 1;
                self.reset_ball();
            }
        } else if self.ball.velocity.x > 0.0 && self.ball.position.x >= RIGHT_FACE {
            if self.right.covers(self.ball.position.y) {
                self.ball.position.x = RIGHT_FACE;
                self.ball.velocity.x = -self.ball.velocity.x;
                self.ball.velocity.y += self.right.velocity * 0.5;
            } else {
                self.score_left += 1;
                self.reset_ball();
            }
        }
    }

    fn frame(&self) -> Frame {
        Frame {
            left_top: self.left.top as usize,
            right_top: self.right.top as usize,
            ball: (self.ball.position.x as usize, self.ball.position.y as usize),
            score_left: self.score_left,
            score_right: self.score_right,
            serving: self.ball.serving,
        }
    }
}

/// The pong application. Left paddle plays on W/S, right paddle on the
/// arrow keys; Space serves, Q or Escape returns to the shell.
pub struct Pong {
    tty: Terminal,
    state: Mutex<Option<Game>>,
    stop: AtomicBool,
}

impl Pong {
    const fn new() -> Pong {
        Pong {
            tty: Terminal::new(),
            state: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    pub fn run(&'static self) {
        self.stop.store(false, Ordering::SeqCst);
        self.tty.initialize();
        self.tty.set_cursor_visible(false);
        self.tty.set_handler(self);

        isr::with_paused(|| {
            *self.state.lock() = Some(Game::new(Rng::new(cycles())));
        });

        CONSOLE.set_active(&self.tty);
        self.draw();

        // launched from inside the keyboard interrupt, where delivery is
        // hardware-disabled; the new main flow re-enables it
        isr::enable_delivery();

        let mut throttle = FrameThrottle::new(cycles(), FRAME_CYCLES);

        while !self.stop.load(Ordering::SeqCst) {
            let Some(elapsed) = throttle.tick(cycles()) else {
                core::hint::spin_loop();
                continue;
            };

            let dt = elapsed as f32 / FRAME_CYCLES as f32;
            isr::with_paused(|| {
                let mut state = self.state.lock();
                if let Some(game) = state.as_mut() {
                    game.update(dt);
                }
            });
            self.draw();
        }

        isr::with_paused(|| {
            *self.state.lock() = None;
        });
        CONSOLE.set_active(&KERNEL_TTY);
    }

    fn draw(&self) {
        // the state lock is only taken under the pause gate; rendering
        // works from the copy
        let frame = isr::with_paused(|| self.state.lock().as_ref().map(Game::frame));
        let Some(frame) = frame else {
            return;
        };

        self.render_frame(&frame);
        CONSOLE.flush(&self.tty);
    }

    fn render_frame(&self, frame: &Frame) {
        let blank = Entry::new(b' ', EntryColor::new(Color::White, Color::Black));
        let wall = Entry::new(b'#', EntryColor::new(Color::LightGray, Color::Black));

        for x in 0..VGA_WIDTH {
            self.tty.set_entry_at(wall, x, 0);
            self.tty.set_entry_at(wall, x, VGA_HEIGHT - 1);
            for y in 1..VGA_HEIGHT - 1 {
                self.tty.set_entry_at(blank, x, y);
            }
        }

        let left = Entry::new(b'@', EntryColor::new(Color::Blue, Color::Black));
        let right = Entry::new(b'@', EntryColor::new(Color::Red, Color::Black));
        for i in 0..PADDLE_HEIGHT {
            self.tty.set_entry_at(left, LEFT_PADDLE_X, frame.left_top + i);
            self.tty
                .set_entry_at(right, RIGHT_PADDLE_X, frame.right_top + i);
        }

        let (bx, by) = frame.ball;
        if bx < VGA_WIDTH && by < VGA_HEIGHT {
            let ball = Entry::new(b'o', EntryColor::new(Color::White, Color::Black));
            self.tty.set_entry_at(ball, bx, by);
        }

        self.tty.set_cursor(VGA_WIDTH / 2 - 4, 0);
        let _ = self
            .tty
            .write_fmt(format_args!("{:>3} : {:<3}", frame.score_left, frame.score_right));

        if frame.serving {
            self.tty.set_cursor(VGA_WIDTH / 2 - 11, VGA_HEIGHT - 3);
            let _ = self.tty.write_fmt(format_args!("press space to serve"));
        }
    }
}

impl KeyHandler for Pong {
    fn handle_key(&self, event: KeyEvent) {
        if event.pressed {
            match event.key {
                Key::Q | Key::Escape => {
                    self.stop.store(true, Ordering::SeqCst);
                    return;
                }
                _ => {}
            }
        }

        let mut state = self.state.lock();
        let Some(game) = state.as_mut() else {
            return;
        };

        if event.pressed {
            match event.key {
                Key::Space => game.serve(),
                Key::W => game.left.velocity = -PADDLE_SPEED,
                Key::S => game.left.velocity = PADDLE_SPEED,
                Key::Up => game.right.velocity = -PADDLE_SPEED,
                Key::Down => game.right.velocity = PADDLE_SPEED,
                _ => {}
            }
        } else {
            match event.key {
                Key::W | Key::S => game.left.velocity = 0.0,
                Key::Up | Key::Down => game.right.velocity = 0.0,
                _ => {}
            }
        }
    }
}

pub static PONG: Pong = Pong::new();
