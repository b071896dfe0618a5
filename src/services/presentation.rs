use std::collections::VecDeque;

/// Screen and audio requests issued by the presentation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationRequest {
    Transition { kind: u8, time: u8, color: [u8; 3] },
    Blackout { active: bool },
    Gamma { enabled: bool },
    MenuMusic { sequence: i16 },
    StopMusic { fade: i16 },
}

pub trait PresentationService {
    fn submit(&mut self, request: PresentationRequest);
}

/// Default [`PresentationService`]: queues requests for the host to drain each frame.
#[derive(Debug, Default)]
pub struct PresentationQueue {
    pending: VecDeque<PresentationRequest>,
}

impl PresentationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = PresentationRequest> + '_ {
        self.pending.drain(..)
    }
}

impl PresentationService for PresentationQueue {
    fn submit(&mut self, request: PresentationRequest) {
        self.pending.push_back(request);
    }
}
