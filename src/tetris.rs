//! Falling-blocks game on its own virtual terminal.

use core::ops::{Add, Neg};
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::app::{cycles, FrameThrottle, Rng};
use crate::compositor::{CONSOLE, KERNEL_TTY};
use crate::isr;
use crate::keyboard::{Key, KeyEvent, KeyHandler};
use crate::terminal::{Color, Entry, EntryColor, Terminal};

const BOARD_WIDTH: i32 = 10;
const BOARD_HEIGHT: i32 = 20;

/// Cycle-counter ticks between gravity steps.
const STEP_CYCLES: u64 = 1_000_000_000;

// board placement on the 80x25 grid
const BOARD_X: usize = 35;
const BOARD_Y: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Vec2 {
        Vec2 { x, y }
    }

    /// Rotates clockwise by `times` quarter turns around the origin.
    pub fn rotated(self, times: u8) -> Vec2 {
        let mut v = self;
        for _ in 0..times % 4 {
            v = Vec2::new(-v.y, v.x);
        }
        v
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

struct Shape {
    blocks: [Vec2; 4],
    rotates: bool,
}

static SHAPES: [Shape; 6] = [
    // T
    Shape {
        blocks: [
            Vec2::new(-1, 0),
            Vec2::new(0, 0),
            Vec2::new(1, 0),
            Vec2::new(0, 1),
        ],
        rotates: true,
    },
    // Z
    Shape {
        blocks: [
            Vec2::new(-1, 0),
            Vec2::new(0, 0),
            Vec2::new(0, 1),
            Vec2::new(1, 1),
        ],
        rotates: true,
    },
    // J
    Shape {
        blocks: [
            Vec2::new(0, -1),
            Vec2::new(0, 0),
            Vec2::new(0, 1),
            Vec2::new(-1, 1),
        ],
        rotates: true,
    },
    // L
    Shape {
        blocks: [
            Vec2::new(0, -1),
            Vec2::new(0, 0),
            Vec2::new(0, 1),
            Vec2::new(1, 1),
        ],
        rotates: true,
    },
    // I
    Shape {
        blocks: [
            Vec2::new(0, -1),
            Vec2::new(0, 0),
            Vec2::new(0, 1),
            Vec2::new(0, 2),
        ],
        rotates: true,
    },
    // O
    Shape {
        blocks: [
            Vec2::new(0, 0),
            Vec2::new(1, 0),
            Vec2::new(0, 1),
            Vec2::new(1, 1),
        ],
        rotates: false,
    },
];

static PIECE_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Blue,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Red,
];

#[derive(Clone, Copy)]
struct Piece {
    shape: &'static Shape,
    position: Vec2,
    color: Color,
    angle: u8,
}

impl Piece {
    fn block_positions(&self) -> [Vec2; 4] {
        let mut out = [Vec2::new(0, 0); 4];
        for (slot, block) in out.iter_mut().zip(self.shape.blocks.iter()) {
            *slot = self.position + block.rotated(self.angle);
        }
        out
    }
}

struct Board {
    cells: [[Option<Color>; BOARD_WIDTH as usize]; BOARD_HEIGHT as usize],
}

impl Board {
    fn new() -> Board {
        Board {
            cells: [[None; BOARD_WIDTH as usize]; BOARD_HEIGHT as usize],
        }
    }

    /// Cells above the top edge count as vacant so fresh pieces can hang
    /// partly off-screen; everything outside the other edges is solid.
    fn is_vacant(&self, pos: Vec2) -> bool {
        if pos.x < 0 || pos.x >= BOARD_WIDTH || pos.y >= BOARD_HEIGHT {
            return false;
        }
        if pos.y < 0 {
            return true;
        }
        self.cells[pos.y as usize][pos.x as usize].is_none()
    }

    fn fits(&self, piece: &Piece) -> bool {
        piece.block_positions().iter().all(|&pos| self.is_vacant(pos))
    }

    fn solidify(&mut self, piece: &Piece) {
        for pos in piece.block_positions() {
            if pos.y >= 0 {
                self.cells[pos.y as usize][pos.x as usize] = Some(piece.color);
            }
        }
    }

    fn clear_full_rows(&mut self) -> usize {
        let mut cleared = 0;
        let mut y = BOARD_HEIGHT as usize - 1;

        loop {
            if self.cells[y].iter().all(|cell| cell.is_some()) {
                for row in (1..=y).rev() {
                    self.cells[row] = self.cells[row - 1];
                }
                self.cells[0] = [None; BOARD_WIDTH as usize];
                cleared += 1;
                // the shifted row now at `y` still needs checking
                continue;
            }

            if y == 0 {
                break;
            }
            y -= 1;
        }

        cleared
    }
}

/// Everything one rendered frame needs, copied out of the locked game
/// state so drawing never holds the lock the keypress handler contends
/// for in interrupt context.
struct Frame {
    cells: [[Option<Color>; BOARD_WIDTH as usize]; BOARD_HEIGHT as usize],
    piece_blocks: [Vec2; 4],
    piece_color: Color,
}

struct Game {
    board: Board,
    piece: Piece,
    rng: Rng,
    rows_cleared: usize,
    lost: bool,
}

impl Game {
    fn new(mut rng: Rng) -> Game {
        let piece = Self::next_piece(&mut rng);
        Game {
            board: Board::new(),
            piece,
            rng,
            rows_cleared: 0,
            lost: false,
        }
    }

    fn next_piece(rng: &mut Rng) -> Piece {
        let index = rng.pick(SHAPES.len() as u64) as usize;
        Piece {
            shape: &SHAPES[index],
            position: Vec2::new(BOARD_WIDTH / 2, 0),
            color: PIECE_COLORS[index],
            angle: 0,
        }
    }

    fn try_shift(&mut self, delta: Vec2) -> bool {
        let moved = Piece {
            position: self.piece.position + delta,
            ..self.piece
        };

        if self.board.fits(&moved) {
            self.piece = moved;
            true
        } else {
            false
        }
    }

    fn try_rotate(&mut self) -> bool {
        if !self.piece.shape.rotates {
            return false;
        }

        let rotated = Piece {
            angle: (self.piece.angle + 1) % 4,
            ..self.piece
        };

        if self.board.fits(&rotated) {
            self.piece = rotated;
            true
        } else {
            false
        }
    }

    /// One gravity step: fall one row, or lock in place and spawn the next
    /// piece. A spawn with no room ends the game.
    fn step(&mut self) {
        if self.lost {
            return;
        }

        if self.try_shift(Vec2::new(0, 1)) {
            return;
        }

        self.board.solidify(&self.piece);
        self.rows_cleared += self.board.clear_full_rows();

        self.piece = Self::next_piece(&mut self.rng);
        if !self.board.fits(&self.piece) {
            self.lost = true;
        }
    }

    fn frame(&self) -> Frame {
        Frame {
            cells: self.board.cells,
            piece_blocks: self.piece.block_positions(),
            piece_color: self.piece.color,
        }
    }
}

/// The tetris application: its own terminal, its own key handler, a
/// blocking run loop paced by the cycle counter.
pub struct Tetris {
    tty: Terminal,
    state: Mutex<Option<Game>>,
    stop: AtomicBool,
}

impl Tetris {
    const fn new() -> Tetris {
        Tetris {
            tty: Terminal::new(),
            state: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    /// Takes over the display until the player quits or loses.
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

        // this loop usually starts inside the interrupt that delivered the
        // launch keystroke, where delivery is hardware-disabled; as the new
        // main flow it turns delivery back on itself
        isr::enable_delivery();

        let mut throttle = FrameThrottle::new(cycles(), STEP_CYCLES);
        let mut lost = false;

        while !self.stop.load(Ordering::SeqCst) && !lost {
            if !throttle.ready(cycles()) {
                core::hint::spin_loop();
                continue;
            }

            isr::with_paused(|| {
                let mut state = self.state.lock();
                if let Some(game) = state.as_mut() {
                    game.step();
                    lost = game.lost;
                }
            });
            self.draw();

            if lost {
                self.draw_lost();
                busy_wait(2 * STEP_CYCLES);
            }
        }

        isr::with_paused(|| {
            *self.state.lock() = None;
        });
        CONSOLE.set_active(&KERNEL_TTY);
    }

    fn draw(&self) {
        // the state lock is only taken under the pause gate: a keystroke
        // handler takes the same lock in interrupt context
        let frame = isr::with_paused(|| self.state.lock().as_ref().map(Game::frame));
        let Some(frame) = frame else {
            return;
        };

        self.render_frame(&frame);
        CONSOLE.flush(&self.tty);
    }

    fn render_frame(&self, frame: &Frame) {
        for y in 0..BOARD_HEIGHT as usize {
            let border = Entry::new(b'|', EntryColor::new(Color::LightGray, Color::Black));
            self.tty.set_entry_at(border, BOARD_X - 1, BOARD_Y + y);
            self.tty
                .set_entry_at(border, BOARD_X + BOARD_WIDTH as usize, BOARD_Y + y);

            for x in 0..BOARD_WIDTH as usize {
                let entry = match frame.cells[y][x] {
                    Some(color) => Entry::new(b' ', EntryColor::new(Color::White, color)),
                    None => Entry::new(b'.', EntryColor::new(Color::DarkGray, Color::Black)),
                };
                self.tty.set_entry_at(entry, BOARD_X + x, BOARD_Y + y);
            }
        }

        for pos in frame.piece_blocks {
            if pos.y >= 0 {
                let entry = Entry::new(b' ', EntryColor::new(Color::White, frame.piece_color));
                self.tty
                    .set_entry_at(entry, BOARD_X + pos.x as usize, BOARD_Y + pos.y as usize);
            }
        }
    }

    fn draw_lost(&self) {
        let color = EntryColor::new(Color::White, Color::Red);
        for (i, c) in "Lost".bytes().enumerate() {
            self.tty
                .set_entry_at(Entry::new(c, color), BOARD_X + 3 + i, BOARD_Y + 10);
        }
        CONSOLE.flush(&self.tty);
    }
}

impl KeyHandler for Tetris {
    fn handle_key(&self, event: KeyEvent) {
        if !event.pressed {
            return;
        }

        match event.key {
            Key::Q | Key::Escape => {
                self.stop.store(true, Ordering::SeqCst);
                return;
            }
            _ => {}
        }

        let moved = {
            let mut state = self.state.lock();
            let Some(game) = state.as_mut() else {
                return;
            };

            match event.key {
                Key::A | Key::Left => game.try_shift(Vec2::new(-1, 0)),
                Key::D | Key::Right => game.try_shift(Vec2::new(1, 0)),
                Key::S | Key::Down => game.try_shift(Vec2::new(0, 1)),
                Key::W | Key::Up => game.try_rotate(),
                _ => return,
            }
        };

        if moved {
            self.draw();
        }
    }
}

pub static TETRIS: Tetris = Tetris::new();

/// Spins until `duration` counter ticks have passed.
fn busy_wait(duration: u64) {
    let start = cycles();
    while cycles().wrapping_sub(start) < duration {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        Game::new(Rng::new(1))
    }

    #[test]
    fn vacancy_treats_rows_above_the_board_as_open() {
        let board = Board::new();
        assert!(board.is_vacant(Vec2::new(4, -3)));
        assert!(board.is_vacant(Vec2::new(0, 0)));
    }

    #[test]
    fn vacancy_rejects_walls_and_floor() {
        let board = Board::new();
        assert!(!board.is_vacant(Vec2::new(-1, 5)));
        assert!(!board.is_vacant(Vec2::new(BOARD_WIDTH, 5)));
        assert!(!board.is_vacant(Vec2::new(4, BOARD_HEIGHT)));
    }

    #[test]
    fn solidified_blocks_are_no_longer_vacant() {
        let mut game = game();
        let positions = game.piece.block_positions();

        game.board.solidify(&game.piece);

        for pos in positions {
            if pos.y >= 0 {
                assert!(!game.board.is_vacant(pos));
            }
        }
    }

    #[test]
    fn four_rotations_return_a_piece_to_its_spawn_pose() {
        let mut game = game();
        // drop into open space so every rotation fits
        for _ in 0..4 {
            game.try_shift(Vec2::new(0, 1));
        }
        let before = game.piece.block_positions();

        let rotates = game.piece.shape.rotates;
        for _ in 0..4 {
            assert_eq!(game.try_rotate(), rotates);
        }

        assert_eq!(game.piece.block_positions(), before);
    }

    #[test]
    fn shifting_into_a_wall_is_refused_and_position_kept() {
        let mut game = game();

        for _ in 0..BOARD_WIDTH {
            game.try_shift(Vec2::new(-1, 0));
        }
        let held = game.piece.position;

        assert!(!game.try_shift(Vec2::new(-1, 0)));
        assert_eq!(game.piece.position, held);
    }

    #[test]
    fn gravity_step_moves_the_piece_down_one_row() {
        let mut game = game();
        let before = game.piece.position;

        game.step();

        assert_eq!(game.piece.position, before + Vec2::new(0, 1));
    }

    #[test]
    fn a_full_row_is_cleared_and_rows_above_shift_down() {
        let mut board = Board::new();
        let last = BOARD_HEIGHT as usize - 1;
        board.cells[last] = [Some(Color::Red); BOARD_WIDTH as usize];
        board.cells[last - 1][3] = Some(Color::Blue);

        assert_eq!(board.clear_full_rows(), 1);

        assert_eq!(board.cells[last][3], Some(Color::Blue));
        assert!(board.cells[last].iter().filter(|c| c.is_some()).count() == 1);
        assert!(board.cells[last - 1].iter().all(|c| c.is_none()));
    }

    #[test]
    fn stacked_full_rows_clear_together() {
        let mut board = Board::new();
        let last = BOARD_HEIGHT as usize - 1;
        board.cells[last] = [Some(Color::Red); BOARD_WIDTH as usize];
        board.cells[last - 1] = [Some(Color::Green); BOARD_WIDTH as usize];

        assert_eq!(board.clear_full_rows(), 2);
        assert!(board.cells[last].iter().all(|c| c.is_none()));
    }

    #[test]
    fn frames_render_while_the_state_lock_is_held_elsewhere() {
        let tetris = Tetris::new();
        tetris.tty.initialize();
        *tetris.state.lock() = Some(Game::new(Rng::new(1)));
        let frame = tetris.state.lock().as_ref().map(Game::frame).unwrap();

        // an interrupted foreground may still hold the game state; drawing
        // works from the captured frame and must not touch the lock
        let _held = tetris.state.lock();
        tetris.render_frame(&frame);

        assert_eq!(tetris.tty.entry_at(BOARD_X - 1, BOARD_Y).character, b'|');
        assert_eq!(
            tetris.tty.entry_at(BOARD_X, BOARD_Y + BOARD_HEIGHT as usize - 1).character,
            b'.'
        );
    }

    #[test]
    fn a_blocked_spawn_ends_the_game() {
        let mut game = game();
        // fill everything but the left column: no row is complete, and the
        // spawn area in the middle is solid
        for row in game.board.cells.iter_mut() {
            *row = [Some(Color::Red); BOARD_WIDTH as usize];
            row[0] = None;
        }

        game.step();

        assert!(game.lost);
    }
}
