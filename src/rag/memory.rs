use std::collections::VecDeque;

/// A completed question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub human: String,
    pub ai: String,
}

/// Sliding window over the last `window` exchanges of a conversation.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    window: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            exchanges: VecDeque::with_capacity(window.max(1)),
        }
    }

    /// Record an exchange, evicting the oldest once the window is full.
    pub fn push(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        if self.exchanges.len() == self.window {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            human: human.into(),
            ai: ai.into(),
        });
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// `Human: ...\nAI: ...` lines, oldest first.
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|e| format!("Human: {}\nAI: {}", e.human, e.ai))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
