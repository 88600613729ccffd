use crate::gb::utils::bit_at;

/// The eight physical buttons, matching the canonical default input mapping
/// in spec.md §6 (Arrows, Z/X, Enter, Backspace/Space).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

/// Which button group P1's bits 3..0 currently reflect.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SelectedGroup {
    Action,
    DPad,
    Both,
    None,
}

/// Translates eight button booleans into the P1 (0xFF00) register according
/// to the group-select bits the game writes.
#[derive(Copy, Clone, Debug, Default)]
pub struct Joypad {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    a: bool,
    b: bool,
    start: bool,
    select: bool,
    select_action: bool,
    select_dpad: bool,
    interrupt_pending: bool,
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    fn selected_group(&self) -> SelectedGroup {
        match (self.select_action, self.select_dpad) {
            (true, true) => SelectedGroup::Both,
            (true, false) => SelectedGroup::DPad,
            (false, true) => SelectedGroup::Action,
            (false, false) => SelectedGroup::None,
        }
    }

    /// Reads P1. Bits 7..6 always read as 1; bits 5..4 reflect the stored
    /// select bits; bits 3..0 are the selected group's button states,
    /// pressed = 0.
    pub fn read(&self) -> u8 {
        let mut value = 0b1100_0000;
        value |= if self.select_action { 0 } else { 0b0010_0000 };
        value |= if self.select_dpad { 0 } else { 0b0001_0000 };

        let (b0, b1, b2, b3) = match self.selected_group() {
            SelectedGroup::Action => (self.a, self.b, self.select, self.start),
            SelectedGroup::DPad => (self.right, self.left, self.up, self.down),
            SelectedGroup::Both => (
                self.a || self.right,
                self.b || self.left,
                self.select || self.up,
                self.start || self.down,
            ),
            SelectedGroup::None => (false, false, false, false),
        };

        if !b0 {
            value |= 0b0001;
        }
        if !b1 {
            value |= 0b0010;
        }
        if !b2 {
            value |= 0b0100;
        }
        if !b3 {
            value |= 0b1000;
        }
        value
    }

    /// Writes P1. Only bits 5..4 (group select) are captured; the rest of
    /// the register is derived on read.
    pub fn write(&mut self, value: u8) {
        self.select_action = !bit_at(value, 5);
        self.select_dpad = !bit_at(value, 4);
    }

    /// Updates one button's pressed state. Raises the Joypad interrupt on a
    /// release-to-press transition of a button in a currently-selected
    /// group (spec.md §9 Open Questions, resolved in SPEC_FULL.md §4.13).
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        let slot = match button {
            Button::Up => &mut self.up,
            Button::Down => &mut self.down,
            Button::Left => &mut self.left,
            Button::Right => &mut self.right,
            Button::A => &mut self.a,
            Button::B => &mut self.b,
            Button::Start => &mut self.start,
            Button::Select => &mut self.select,
        };
        let was_pressed = *slot;
        *slot = pressed;

        if pressed && !was_pressed && self.button_is_selected(button) {
            self.interrupt_pending = true;
        }
    }

    fn button_is_selected(&self, button: Button) -> bool {
        match button {
            Button::A | Button::B | Button::Select | Button::Start => self.select_action,
            Button::Up | Button::Down | Button::Left | Button::Right => self.select_dpad,
        }
    }

    /// Consumes the one-shot interrupt-pending flag.
    pub fn take_interrupt_pending(&mut self) -> bool {
        std::mem::take(&mut self.interrupt_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unselected_reads_all_ones_in_low_nibble() {
        let joypad = Joypad::new();
        assert_eq!(joypad.read() & 0x0F, 0x0F);
    }

    #[test]
    fn dpad_group_reports_pressed_as_zero() {
        let mut joypad = Joypad::new();
        joypad.write(0b0010_0000); // select dpad (bit 4 clear)
        joypad.set_button(Button::Up, true);
        let value = joypad.read();
        assert_eq!(value & 0b0100, 0);
        assert_eq!(value & 0b1011, 0b1011);
    }

    #[test]
    fn press_while_selected_raises_interrupt_once() {
        let mut joypad = Joypad::new();
        joypad.write(0b0001_0000); // select action group (bit 5 clear)
        joypad.set_button(Button::A, true);
        assert!(joypad.take_interrupt_pending());
        assert!(!joypad.take_interrupt_pending());
    }

    #[test]
    fn press_while_not_selected_does_not_raise_interrupt() {
        let mut joypad = Joypad::new();
        joypad.write(0b0010_0000); // select dpad, action unselected
        joypad.set_button(Button::A, true);
        assert!(!joypad.take_interrupt_pending());
    }
}
