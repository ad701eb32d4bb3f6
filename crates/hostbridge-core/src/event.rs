use std::fmt;

use crate::registry::HandlerId;

/// Message tags understood by the bridge.
///
/// Integer codes are what the host passes across its entry points. Codes the
/// bridge does not know are carried through untouched as `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Message {
    #[default]
    Null,
    StartupScript,
    Start,
    Restart,
    Resume,
    Pause,
    Stop,
    Destroy,
    SurfaceCreated,
    SurfaceChanged,
    SurfaceDestroyed,
    TouchDown,
    TouchMove,
    TouchUp,
    /// Application-defined code. Codes in the reserved range
    /// (`MESSAGE_BASE..=MESSAGE_BASE + 12`) and 0 alias the named variants and
    /// come back from `from_code` as those. Build from raw codes with
    /// [`Message::from_code`] so equality with the named variant holds.
    Custom(i32),
}

/// Base of the host message range; everything below is reserved.
pub const MESSAGE_BASE: i32 = 0x0400;

impl Message {
    const TABLE: [(Message, i32); 13] = [
        (Message::StartupScript, MESSAGE_BASE),
        (Message::Start, MESSAGE_BASE + 1),
        (Message::Restart, MESSAGE_BASE + 2),
        (Message::Resume, MESSAGE_BASE + 3),
        (Message::Pause, MESSAGE_BASE + 4),
        (Message::Stop, MESSAGE_BASE + 5),
        (Message::Destroy, MESSAGE_BASE + 6),
        (Message::SurfaceCreated, MESSAGE_BASE + 7),
        (Message::SurfaceChanged, MESSAGE_BASE + 8),
        (Message::SurfaceDestroyed, MESSAGE_BASE + 9),
        (Message::TouchDown, MESSAGE_BASE + 10),
        (Message::TouchMove, MESSAGE_BASE + 11),
        (Message::TouchUp, MESSAGE_BASE + 12),
    ];

    pub fn code(self) -> i32 {
        match self {
            Message::Null => 0,
            Message::Custom(c) => c,
            known => Self::TABLE
                .iter()
                .find(|(m, _)| *m == known)
                .map(|(_, c)| *c)
                .unwrap_or(0),
        }
    }

    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            return Message::Null;
        }
        Self::TABLE
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(m, _)| *m)
            .unwrap_or(Message::Custom(code))
    }

    #[inline]
    pub fn is_touch(self) -> bool {
        matches!(self, Message::TouchDown | Message::TouchMove | Message::TouchUp)
    }
}

/// A single event travelling from the host to the engine thread.
///
/// `wparam`/`lparam` are raw 64-bit slots. Producers that need two 32-bit
/// values (floats or ints) pack them into the low/high halves.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Event {
    pub message: Message,
    pub wparam: u64,
    pub lparam: u64,
    pub result: Option<i64>,
}

#[inline]
fn split(v: u64) -> (u32, u32) {
    (v as u32, (v >> 32) as u32)
}

#[inline]
fn join(lo: u32, hi: u32) -> u64 {
    (lo as u64) | ((hi as u64) << 32)
}

impl Event {
    pub fn new(message: Message, wparam: u64, lparam: u64) -> Self {
        Self {
            message,
            wparam,
            lparam,
            result: None,
        }
    }

    /// Overwrite every field. Used when recycling pooled events.
    #[inline]
    pub fn fill(&mut self, message: Message, wparam: u64, lparam: u64, result: Option<i64>) {
        self.message = message;
        self.wparam = wparam;
        self.lparam = lparam;
        self.result = result;
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn wparam_f32(&self) -> (f32, f32) {
        let (lo, hi) = split(self.wparam);
        (f32::from_bits(lo), f32::from_bits(hi))
    }

    pub fn set_wparam_f32(&mut self, f0: f32, f1: f32) {
        self.wparam = join(f0.to_bits(), f1.to_bits());
    }

    pub fn lparam_f32(&self) -> (f32, f32) {
        let (lo, hi) = split(self.lparam);
        (f32::from_bits(lo), f32::from_bits(hi))
    }

    pub fn set_lparam_f32(&mut self, f0: f32, f1: f32) {
        self.lparam = join(f0.to_bits(), f1.to_bits());
    }

    pub fn wparam_i32(&self) -> (i32, i32) {
        let (lo, hi) = split(self.wparam);
        (lo as i32, hi as i32)
    }

    pub fn lparam_i32(&self) -> (i32, i32) {
        let (lo, hi) = split(self.lparam);
        (lo as i32, hi as i32)
    }

    /// Low half as f32, high half as i32. This is the touch layout:
    /// contact size then pointer id.
    pub fn set_lparam_f32_i32(&mut self, f0: f32, i1: i32) {
        self.lparam = join(f0.to_bits(), i1 as u32);
    }

    /// Decode a touch event, if this is one.
    pub fn touch(&self) -> Option<Touch> {
        if !self.message.is_touch() {
            return None;
        }
        let (x, y) = self.wparam_f32();
        let (contact, _) = self.lparam_f32();
        let (_, id) = self.lparam_i32();
        Some(Touch {
            phase: self.message,
            x,
            y,
            contact,
            pointer_id: id,
            tick: self.result.unwrap_or(0),
        })
    }
}

/// Decoded view of a touch event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub phase: Message,
    pub x: f32,
    pub y: f32,
    pub contact: f32,
    pub pointer_id: i32,
    pub tick: i64,
}

impl Touch {
    /// Host touch kinds: 0 = down, 1 = move, 2 = up.
    pub fn message_for_kind(kind: i32) -> Option<Message> {
        match kind {
            0 => Some(Message::TouchDown),
            1 => Some(Message::TouchMove),
            2 => Some(Message::TouchUp),
            _ => None,
        }
    }

    pub fn write_into(&self, ev: &mut Event) {
        ev.message = self.phase;
        ev.set_wparam_f32(self.x, self.y);
        ev.set_lparam_f32_i32(self.contact, self.pointer_id);
        ev.result = Some(self.tick);
    }
}

/// Queue entry: an owned event plus an optional dispatch target.
///
/// `target == None` means "offer to the application step, then broadcast".
pub struct EventEnvelope {
    pub target: Option<HandlerId>,
    pub event: Box<Event>,
}

impl EventEnvelope {
    #[inline]
    pub fn new(event: Box<Event>, target: Option<HandlerId>) -> Self {
        Self { target, event }
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("target", &self.target)
            .field("message", &self.event.message)
            .finish()
    }
}
