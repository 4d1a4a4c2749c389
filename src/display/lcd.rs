//! Character-grid backend: HD44780 controller behind a PCF8574 I2C expander
//!
//! The expander drives the controller in 4-bit mode. Each expander byte
//! carries one nibble on P4-P7 plus the control lines:
//!
//! | bit | line |
//! |-----|------|
//! | P0  | RS (register select) |
//! | P1  | RW (held low) |
//! | P2  | E (enable strobe) |
//! | P3  | backlight |

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{DisplayBackend, DisplayMode};
use crate::{Error, Result};

const RS: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE_INCREMENT: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

/// DDRAM start address of each row
const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

/// HD44780 driver over a PCF8574 backpack
pub struct Hd44780<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> Hd44780<I2C, D> {
    /// Run the 4-bit initialization sequence
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` if the expander does not acknowledge
    pub fn new(i2c: I2C, delay: D, address: u8) -> Result<Self> {
        let mut lcd = Self {
            i2c,
            delay,
            address,
        };
        lcd.init()?;
        Ok(lcd)
    }

    fn init(&mut self) -> Result<()> {
        self.delay.delay_ms(50);

        // Force 8-bit mode three times, then switch to 4-bit
        self.write_nibble(0x30, 0)?;
        self.delay.delay_us(4500);
        self.write_nibble(0x30, 0)?;
        self.delay.delay_us(4500);
        self.write_nibble(0x30, 0)?;
        self.delay.delay_us(150);
        self.write_nibble(0x20, 0)?;

        self.command(CMD_FUNCTION_4BIT_2LINE)?;
        self.command(CMD_DISPLAY_ON)?;
        self.clear()?;
        self.command(CMD_ENTRY_MODE_INCREMENT)
    }

    /// Send an instruction byte
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` on bus failure
    pub fn command(&mut self, value: u8) -> Result<()> {
        self.send(value, 0)
    }

    /// Blank the screen and home the cursor
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` on bus failure
    pub fn clear(&mut self) -> Result<()> {
        self.command(CMD_CLEAR)?;
        self.delay.delay_ms(2);
        Ok(())
    }

    /// Move the cursor
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` on bus failure or an out-of-range row
    pub fn set_cursor(&mut self, col: u8, row: usize) -> Result<()> {
        let offset = ROW_OFFSETS
            .get(row)
            .ok_or_else(|| Error::Display(format!("row {row} out of range")))?;
        self.command(CMD_SET_DDRAM | offset.wrapping_add(col))
    }

    /// Write text at the cursor; non-ASCII characters become `?`
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` on bus failure
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        for c in text.chars() {
            let byte = if c.is_ascii() && !c.is_ascii_control() {
                u8::try_from(c).unwrap_or(b'?')
            } else {
                b'?'
            };
            self.send(byte, RS)?;
        }
        Ok(())
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<()> {
        self.write_nibble(value & 0xF0, mode)?;
        self.write_nibble((value << 4) & 0xF0, mode)
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) -> Result<()> {
        let data = nibble | mode;
        self.expander_write(data)?;
        self.expander_write(data | ENABLE)?;
        self.delay.delay_us(1);
        self.expander_write(data & !ENABLE)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn expander_write(&mut self, data: u8) -> Result<()> {
        self.i2c
            .write(self.address, &[data | BACKLIGHT])
            .map_err(|e| {
                Error::Display(format!("i2c write to {:#04x} failed: {e:?}", self.address))
            })
    }
}

/// Character-grid [`DisplayBackend`]
pub struct LcdBackend<I2C, D> {
    lcd: Hd44780<I2C, D>,
    cols: usize,
    rows: usize,
}

impl<I2C: I2c, D: DelayNs> LcdBackend<I2C, D> {
    /// Connect to the backpack at `address` and initialize the controller
    ///
    /// # Errors
    ///
    /// Returns `Error::Display` if the device does not respond
    pub fn connect(i2c: I2C, delay: D, address: u8, cols: usize, rows: usize) -> Result<Self> {
        let lcd = Hd44780::new(i2c, delay, address)?;
        tracing::info!(
            address = format_args!("{address:#04x}"),
            cols,
            rows,
            "character display initialized"
        );
        Ok(Self {
            lcd,
            cols,
            rows: rows.clamp(1, ROW_OFFSETS.len()),
        })
    }

    fn write_row(&mut self, row: usize, text: &str) -> Result<()> {
        if row >= self.rows {
            return Ok(());
        }
        let padded: String = text
            .chars()
            .chain(std::iter::repeat(' '))
            .take(self.cols)
            .collect();
        self.lcd.set_cursor(0, row)?;
        self.lcd.write_str(&padded)
    }
}

impl<I2C: I2c, D: DelayNs> DisplayBackend for LcdBackend<I2C, D> {
    fn mode(&self) -> DisplayMode {
        DisplayMode::CharacterGrid
    }

    fn width(&self) -> usize {
        self.cols
    }

    fn write_lines(&mut self, line1: &str, line2: &str) -> Result<()> {
        self.write_row(0, line1)?;
        self.write_row(1, line2)
    }

    fn clear(&mut self) -> Result<()> {
        self.lcd.clear()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    use super::*;

    #[derive(Clone, Default)]
    struct MockI2c {
        writes: Rc<RefCell<Vec<(u8, u8)>>>,
        absent: bool,
    }

    impl ErrorType for MockI2c {
        type Error = ErrorKind;
    }

    impl I2c for MockI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> std::result::Result<(), Self::Error> {
            if self.absent {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                if let Operation::Write(bytes) = op {
                    for byte in bytes.iter() {
                        self.writes.borrow_mut().push((address, *byte));
                    }
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    /// Reassemble (rs, byte) pairs from the strobed nibbles
    fn decode(writes: &[(u8, u8)]) -> Vec<(bool, u8)> {
        let strobes: Vec<u8> = writes
            .iter()
            .map(|(_, b)| *b)
            .filter(|b| b & ENABLE != 0)
            .collect();

        strobes
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0] & RS != 0, (pair[0] & 0xF0) | (pair[1] >> 4)))
            .collect()
    }

    #[test]
    fn init_sequence_switches_to_four_bit_mode() {
        let i2c = MockI2c::default();
        let writes = Rc::clone(&i2c.writes);
        Hd44780::new(i2c, NoDelay, 0x27).unwrap();

        let writes = writes.borrow();
        assert!(writes.iter().all(|(addr, b)| *addr == 0x27 && b & BACKLIGHT != 0));

        let strobes: Vec<u8> = writes
            .iter()
            .map(|(_, b)| *b)
            .filter(|b| b & ENABLE != 0)
            .map(|b| b & 0xF0)
            .collect();
        assert_eq!(&strobes[..4], &[0x30, 0x30, 0x30, 0x20]);

        // Remaining strobes are full instruction bytes
        let commands: Vec<u8> = decode(&writes[writes.len() - 4 * 2 * 3..])
            .into_iter()
            .map(|(_, b)| b)
            .collect();
        assert_eq!(
            commands,
            vec![
                CMD_FUNCTION_4BIT_2LINE,
                CMD_DISPLAY_ON,
                CMD_CLEAR,
                CMD_ENTRY_MODE_INCREMENT
            ]
        );
    }

    #[test]
    fn lines_are_padded_to_width() {
        let i2c = MockI2c::default();
        let writes = Rc::clone(&i2c.writes);
        let mut backend = LcdBackend::connect(i2c, NoDelay, 0x27, 8, 2).unwrap();
        writes.borrow_mut().clear();

        backend.write_lines("Hi", "a much longer line").unwrap();

        let decoded = decode(&writes.borrow());
        let text: String = decoded
            .iter()
            .filter(|(rs, _)| *rs)
            .map(|(_, b)| *b as char)
            .collect();
        assert_eq!(text, "Hi      a much l");

        let cursor_moves: Vec<u8> = decoded
            .iter()
            .filter(|(rs, _)| !*rs)
            .map(|(_, b)| *b)
            .collect();
        assert_eq!(cursor_moves, vec![CMD_SET_DDRAM, CMD_SET_DDRAM | 0x40]);
    }

    #[test]
    fn non_ascii_is_replaced() {
        let i2c = MockI2c::default();
        let writes = Rc::clone(&i2c.writes);
        let mut lcd = Hd44780::new(i2c, NoDelay, 0x27).unwrap();
        writes.borrow_mut().clear();

        lcd.write_str("é!").unwrap();
        let bytes: Vec<u8> = decode(&writes.borrow()).into_iter().map(|(_, b)| b).collect();
        assert_eq!(bytes, b"?!");
    }

    #[test]
    fn missing_device_fails_to_connect() {
        let i2c = MockI2c {
            absent: true,
            ..MockI2c::default()
        };
        let err = LcdBackend::connect(i2c, NoDelay, 0x27, 16, 2).err().unwrap();
        assert!(matches!(err, Error::Display(_)));
    }
}
