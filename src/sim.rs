//! Byte level SD/MMC card model for driver tests.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use hex_literal::hex;

use crate::bus::{BusConfig, Completion, Peripheral, Spi, Transfer};
use crate::sd::BLOCK_SIZE;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Class {
    MMC,
    SD1,
    SD2Byte,
    SD2Block,
    /// Nothing drives MISO.
    Absent,
}

/// Every CS edge request is recorded, repeated ones included.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Select,
    Deselect,
    Command(u8, u32),
}

enum Data {
    Idle,
    AwaitToken { sector: u32, multiple: bool },
    Receiving { sector: u32, multiple: bool, block: Vec<u8> },
}

pub struct SimCard {
    class: Class,
    pub sectors: HashMap<u32, [u8; BLOCK_SIZE]>,
    pub csd: [u8; 16],
    pub sd_status: [u8; 64],
    pub events: Vec<Event>,
    /// Bytes clocked, CS asserted or not.
    pub exchanged: usize,
    pub clocks: Vec<u32>,
    /// Card stays busy once this many blocks are written.
    pub stall_after_blocks: Option<usize>,
    pub hold_completions: bool,
    pub held: Vec<Completion>,
    /// ACMD41 or CMD1 answers still reporting idle.
    pub op_cond_polls: u32,
    /// Command index answered with an illegal command R1.
    pub reject_command: Option<u8>,
    /// CMD8 echoes a wrong check pattern.
    pub bad_echo: bool,
    /// Sector whose read answers R1 but never sends a data token.
    pub silent_sector: Option<u32>,
    /// Sector whose read answers an out of range error token.
    pub error_token_sector: Option<u32>,
    selected: bool,
    idle: bool,
    app: bool,
    stalled: bool,
    blocks_written: usize,
    erase_start: u32,
    erase_end: u32,
    frame: Vec<u8>,
    out: VecDeque<u8>,
    data: Data,
}

impl SimCard {
    pub fn new(class: Class) -> Self {
        let csd = match class {
            Class::SD2Block => hex!("40 0E 00 32 5B 59 00 00 0F FF 7F 80 0A 40 00 01"),
            _ => hex!("00 26 00 32 5F 59 83 C8 AD DB CF FF D2 40 40 A5"),
        };
        let mut sd_status = [0u8; 64];
        sd_status[10] = 0x90; // AU_SIZE 4MiB
        Self {
            class,
            sectors: HashMap::new(),
            csd,
            sd_status,
            events: Vec::new(),
            exchanged: 0,
            clocks: Vec::new(),
            stall_after_blocks: None,
            hold_completions: false,
            held: Vec::new(),
            op_cond_polls: 3,
            reject_command: None,
            bad_echo: false,
            silent_sector: None,
            error_token_sector: None,
            selected: false,
            idle: false,
            app: false,
            stalled: false,
            blocks_written: 0,
            erase_start: 0,
            erase_end: 0,
            frame: Vec::with_capacity(6),
            out: VecDeque::new(),
            data: Data::Idle,
        }
    }

    pub fn sector(&self, sector: u32) -> [u8; BLOCK_SIZE] {
        self.sectors.get(&sector).copied().unwrap_or([0u8; BLOCK_SIZE])
    }

    /// Events since the last command frame.
    pub fn events_after_last_command(&self) -> &[Event] {
        let position = self.events.iter().rposition(|e| matches!(e, Event::Command(..)));
        &self.events[position.map(|p| p + 1).unwrap_or(0)..]
    }

    pub fn commands(&self) -> Vec<(u8, u32)> {
        let commands = self.events.iter().filter_map(|e| match e {
            Event::Command(index, argument) => Some((*index, *argument)),
            _ => None,
        });
        commands.collect()
    }

    fn set_selected(&mut self, selected: bool) {
        self.events.push(if selected { Event::Select } else { Event::Deselect });
        if self.selected && !selected {
            self.frame.clear();
            self.out.clear();
            self.data = Data::Idle;
        }
        self.selected = selected;
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        self.exchanged += 1;
        if !self.selected {
            return 0xFF;
        }
        if let Some(byte) = self.out.pop_front() {
            return byte;
        }
        if self.stalled {
            return 0x00;
        }

        match mem::replace(&mut self.data, Data::Idle) {
            Data::Idle => (),
            Data::AwaitToken { sector, multiple } => {
                match (byte, multiple) {
                    (0xFE, false) | (0xFC, true) => {
                        let block = Vec::with_capacity(BLOCK_SIZE + 2);
                        self.data = Data::Receiving { sector, multiple, block };
                    }
                    (0xFD, true) => self.out.push_back(0x00),
                    _ => self.data = Data::AwaitToken { sector, multiple },
                }
                return 0xFF;
            }
            Data::Receiving { sector, multiple, mut block } => {
                block.push(byte);
                if block.len() < BLOCK_SIZE + 2 {
                    self.data = Data::Receiving { sector, multiple, block };
                    return 0xFF;
                }
                let mut data = [0u8; BLOCK_SIZE];
                data.copy_from_slice(&block[..BLOCK_SIZE]);
                self.sectors.insert(sector, data);
                self.blocks_written += 1;
                self.out.extend([0xE5, 0x00, 0x00]);
                self.stalled = self.stall_after_blocks == Some(self.blocks_written);
                if multiple {
                    self.data = Data::AwaitToken { sector: sector + 1, multiple };
                }
                return 0xFF;
            }
        }

        if self.frame.is_empty() && byte & 0xC0 != 0x40 {
            return 0xFF;
        }
        self.frame.push(byte);
        if self.frame.len() == 6 {
            let frame = mem::take(&mut self.frame);
            self.execute(frame[0] & 0x3F, u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]));
        }
        0xFF
    }

    fn sector_of(&self, address: u32) -> Option<u32> {
        match self.class {
            Class::SD2Block => Some(address),
            _ if address % BLOCK_SIZE as u32 == 0 => Some(address / BLOCK_SIZE as u32),
            _ => None,
        }
    }

    fn poll_op_cond(&mut self) -> u8 {
        if self.op_cond_polls > 0 {
            self.op_cond_polls -= 1;
            return 0x01;
        }
        self.idle = false;
        0x00
    }

    fn packet(data: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFF, 0xFE];
        packet.extend_from_slice(data);
        packet.extend([0x00, 0x00]);
        packet
    }

    fn execute(&mut self, index: u8, argument: u32) {
        self.events.push(Event::Command(index, argument));
        if self.class == Class::Absent {
            return;
        }
        let app = mem::replace(&mut self.app, false);
        let idle = self.idle as u8;
        let sd = self.class != Class::MMC;
        let sd2 = matches!(self.class, Class::SD2Byte | Class::SD2Block);
        if self.reject_command == Some(index) {
            self.out.extend([0xFF, 0x04 | idle]);
            return;
        }
        let (r1, extra) = match (app, index) {
            (_, 0) => {
                self.idle = true;
                (0x01, vec![])
            }
            (false, 8) if sd2 => {
                let echo = if self.bad_echo { !argument as u8 } else { argument as u8 };
                (idle, vec![0x00, 0x00, (argument >> 8) as u8 & 0xF, echo])
            }
            (false, 55) if sd => {
                self.app = true;
                (idle, vec![])
            }
            (true, 41) => (self.poll_op_cond(), vec![]),
            (false, 1) if !sd => (self.poll_op_cond(), vec![]),
            (false, 58) => {
                let ocr = match self.class {
                    Class::SD2Block => [0xC0, 0xFF, 0x80, 0x00],
                    _ => [0x80, 0xFF, 0x80, 0x00],
                };
                (idle, ocr.to_vec())
            }
            (false, 16) if argument == BLOCK_SIZE as u32 => (idle, vec![]),
            (false, 9) => (0x00, Self::packet(&self.csd)),
            (true, 13) => {
                let mut extra = vec![0x00];
                extra.extend(Self::packet(&self.sd_status));
                (0x00, extra)
            }
            (true, 23) => (0x00, vec![]),
            (false, 17) => match self.sector_of(argument) {
                Some(sector) if self.silent_sector == Some(sector) => (0x00, vec![]),
                Some(sector) if self.error_token_sector == Some(sector) => (0x00, vec![0xFF, 0x08]),
                Some(sector) => (0x00, Self::packet(&self.sector(sector))),
                None => (0x20, vec![]),
            },
            (false, 24) | (false, 25) => match self.sector_of(argument) {
                Some(sector) => {
                    self.data = Data::AwaitToken { sector, multiple: index == 25 };
                    (0x00, vec![])
                }
                None => (0x20, vec![]),
            },
            (false, 32) | (false, 33) => match self.sector_of(argument) {
                Some(sector) if index == 32 => {
                    self.erase_start = sector;
                    (0x00, vec![])
                }
                Some(sector) => {
                    self.erase_end = sector;
                    (0x00, vec![])
                }
                None => (0x20, vec![]),
            },
            (false, 38) => {
                for sector in self.erase_start..=self.erase_end {
                    self.sectors.remove(&sector);
                }
                (0x00, vec![0x00, 0x00, 0x00])
            }
            _ => (0x04 | idle, vec![]),
        };
        self.out.push_back(0xFF); // Ncr
        self.out.push_back(r1);
        self.out.extend(extra);
    }
}

pub struct SimSpi {
    card: Arc<Mutex<SimCard>>,
    peripheral: Peripheral,
}

fn lock(card: &Mutex<SimCard>) -> MutexGuard<'_, SimCard> {
    card.lock().unwrap()
}

impl Spi for SimSpi {
    type Error = Infallible;

    fn peripheral(&self) -> Peripheral {
        self.peripheral
    }

    fn configure(&mut self, config: &BusConfig) -> Result<(), Infallible> {
        lock(&self.card).clocks.push(config.clock_hz);
        Ok(())
    }

    fn exchange(&mut self, byte: u8) -> Result<u8, Infallible> {
        Ok(lock(&self.card).exchange(byte))
    }

    fn start_transfer(&mut self, transfer: Transfer<'_>, done: Completion) -> Result<(), Infallible> {
        let mut card = lock(&self.card);
        match transfer {
            Transfer::Write(tx) => tx.iter().for_each(|&byte| {
                card.exchange(byte);
            }),
            Transfer::Read(rx) => rx.iter_mut().for_each(|byte| *byte = card.exchange(0xFF)),
        }
        match card.hold_completions {
            true => card.held.push(done),
            false => {
                thread::spawn(move || done.complete());
            }
        }
        Ok(())
    }
}

pub struct SimCs(Arc<Mutex<SimCard>>);

impl OutputPin for SimCs {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        lock(&self.0).set_selected(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        lock(&self.0).set_selected(false);
        Ok(())
    }
}

/// Shared input level, high while set.
#[derive(Clone, Default)]
pub struct SimPin(pub Arc<AtomicBool>);

impl SimPin {
    pub fn set(&self, high: bool) {
        self.0.store(high, Ordering::SeqCst)
    }
}

impl InputPin for SimPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.0.load(Ordering::SeqCst))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.0.load(Ordering::SeqCst))
    }
}

pub fn attach(class: Class, peripheral: Peripheral) -> (SimSpi, SimCs, Arc<Mutex<SimCard>>) {
    let card = Arc::new(Mutex::new(SimCard::new(class)));
    let spi = SimSpi { card: card.clone(), peripheral };
    (spi, SimCs(card.clone()), card)
}
