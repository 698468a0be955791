//! Standard controller
//!
//! An 8-bit parallel-in/serial-out shift register at $4016. Writing bit 0
//! high latches the buttons continuously; once it goes low, each read shifts
//! out one button in the order A, B, Select, Start, Up, Down, Left, Right.

/// Controller buttons in shift order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Up = 4,
    Down = 5,
    Left = 6,
    Right = 7,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
    ];
}

#[derive(Debug, Clone, Default)]
pub struct StandardController {
    pressed: [bool; 8],
    strobe: bool,
    index: usize,
}

impl StandardController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, button: Button) {
        self.pressed[button as usize] = true;
    }

    pub fn release(&mut self, button: Button) {
        self.pressed[button as usize] = false;
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.pressed[button as usize]
    }

    /// $4016 write
    pub fn write(&mut self, value: u8) {
        self.strobe = value & 0x01 != 0;
        if self.strobe {
            self.index = 0;
        }
    }

    /// $4016 read, one bit
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            return u8::from(self.pressed[Button::A as usize]);
        }
        if self.index > 7 {
            return 1;
        }
        let bit = u8::from(self.pressed[self.index]);
        self.index += 1;
        bit
    }
}
