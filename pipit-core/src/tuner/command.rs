use std::fmt;
use std::rc::Rc;

use pipit_audio::NodeId;

/// Raw protocol value meaning STOP (pattern) or AUTO (channel).
pub const STOP: i32 = -1;
/// Raw protocol value meaning RELEASE (pattern) or STOP_ALL (channel).
pub const RELEASE: i32 = -2;
pub const AUTO: i32 = STOP;
pub const STOP_ALL: i32 = RELEASE;

/// Pattern argument of `sfx` and `music`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfxCommand {
    Play(usize),
    Stop,
    /// Let a looping sequence finish its current pass, then stop
    Release,
}

impl From<i32> for SfxCommand {
    fn from(raw: i32) -> Self {
        match raw {
            RELEASE => SfxCommand::Release,
            n if n >= 0 => SfxCommand::Play(n as usize),
            _ => SfxCommand::Stop,
        }
    }
}

/// Channel argument of `sfx` and `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelect {
    Index(usize),
    /// First idle channel, else the first non-monopolized one
    Auto,
    StopAll,
}

impl From<i32> for ChannelSelect {
    fn from(raw: i32) -> Self {
        match raw {
            STOP_ALL => ChannelSelect::StopAll,
            n if n >= 0 => ChannelSelect::Index(n as usize),
            _ => ChannelSelect::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceKind {
    #[default]
    Sfx,
    Music,
}

pub type Callback = Rc<dyn Fn()>;

/// Per-request playback controls.
#[derive(Clone, Default)]
pub struct Controllers {
    /// Absolute start time; the device clock when unset
    pub when: Option<f64>,
    pub monopolized: bool,
    pub kind: SequenceKind,
    /// `[entry, exit]` external processor pair
    pub processor: Option<Vec<NodeId>>,
    /// Loop the whole pattern when it has no loop window
    pub looping: bool,
    pub on_finished: Option<Callback>,
    pub on_all_finished: Option<Callback>,
}

impl Controllers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, when: f64) -> Self {
        self.when = Some(when);
        self
    }

    pub fn monopolized(mut self, monopolized: bool) -> Self {
        self.monopolized = monopolized;
        self
    }

    pub fn kind(mut self, kind: SequenceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn processor(mut self, entry: NodeId, exit: NodeId) -> Self {
        self.processor = Some(vec![entry, exit]);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn on_finished(mut self, f: impl Fn() + 'static) -> Self {
        self.on_finished = Some(Rc::new(f));
        self
    }

    pub fn on_all_finished(mut self, f: impl Fn() + 'static) -> Self {
        self.on_all_finished = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for Controllers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controllers")
            .field("when", &self.when)
            .field("monopolized", &self.monopolized)
            .field("kind", &self.kind)
            .field("processor", &self.processor)
            .field("looping", &self.looping)
            .field("on_finished", &self.on_finished.is_some())
            .field("on_all_finished", &self.on_all_finished.is_some())
            .finish()
    }
}
