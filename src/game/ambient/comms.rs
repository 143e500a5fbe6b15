//! Voice line queue for ambient groups.
//!
//! Lines are delivered highest priority first, oldest first within a
//! priority, and no more than one per communication interval. When the queue
//! is full the oldest line of the lowest queued priority is dropped.

use rand::seq::SliceRandom;
use rand::Rng;

use super::GroupBehavior;
use crate::game::faction::Faction;
use crate::game::types::GroupId;
use crate::host::MessagePriority;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub group: GroupId,
    pub text: String,
    pub priority: MessagePriority,
    seq: u64,
}

#[derive(Debug)]
pub struct CommsQueue {
    messages: Vec<QueuedMessage>,
    capacity: usize,
    interval_ms: f64,
    last_delivery_ms: Option<f64>,
    next_seq: u64,
    dropped: u64,
}

impl CommsQueue {
    pub fn new(capacity: usize, interval_ms: f64) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            interval_ms,
            last_delivery_ms: None,
            next_seq: 0,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Lines discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn push(&mut self, group: GroupId, text: impl Into<String>, priority: MessagePriority) {
        self.messages.push(QueuedMessage {
            group,
            text: text.into(),
            priority,
            seq: self.next_seq,
        });
        self.next_seq += 1;

        if self.messages.len() > self.capacity {
            if let Some(victim) = self
                .messages
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| (m.priority, m.seq))
                .map(|(i, _)| i)
            {
                let dropped = self.messages.remove(victim);
                self.dropped += 1;
                tracing::trace!(group = %dropped.group, "Comms queue full, dropped '{}'", dropped.text);
            }
        }
    }

    /// Next line if the communication interval has elapsed
    pub fn pop_due(&mut self, now_ms: f64) -> Option<QueuedMessage> {
        if self
            .last_delivery_ms
            .is_some_and(|t| now_ms - t < self.interval_ms)
        {
            return None;
        }
        let next = self
            .messages
            .iter()
            .enumerate()
            .max_by_key(|(_, m)| (m.priority, std::cmp::Reverse(m.seq)))
            .map(|(i, _)| i)?;
        self.last_delivery_ms = Some(now_ms);
        Some(self.messages.remove(next))
    }

    /// Forget every line from a group that has left
    pub fn drop_group(&mut self, group: GroupId) {
        self.messages.retain(|m| m.group != group);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Priority of a group's arrival line
pub fn arrival_priority(behavior: GroupBehavior) -> MessagePriority {
    match behavior {
        GroupBehavior::Raider => MessagePriority::High,
        GroupBehavior::Patrol | GroupBehavior::DiplomaticEscort => MessagePriority::Normal,
        GroupBehavior::TradeConvoy | GroupBehavior::Exploration | GroupBehavior::MiningOperation => {
            MessagePriority::Low
        }
    }
}

/// Faction-flavored arrival line
pub fn arrival_line<R: Rng + ?Sized>(faction: Faction, behavior: GroupBehavior, rng: &mut R) -> String {
    let lines: &[&str] = match (faction, behavior) {
        (Faction::Pirates, _) => &[
            "Fresh prey on the scopes. Spread out and close in.",
            "Nobody leaves this sector with a full hold.",
            "Cut their engines, then their comms.",
        ],
        (Faction::Federation, GroupBehavior::Patrol) => &[
            "Federation patrol on station. Keep it clean out here.",
            "This is Federation Command. Patrol route confirmed.",
        ],
        (Faction::Empire, GroupBehavior::Patrol) => &[
            "Imperial patrol. Identify yourselves.",
            "Sector under Imperial watch. Proceed with caution.",
        ],
        (_, GroupBehavior::DiplomaticEscort) => &[
            "Diplomatic transit in progress. Maintain distance.",
            "Escort wing, tighten up around the envoy.",
        ],
        (_, GroupBehavior::TradeConvoy) => &[
            "Convoy departing. Cargo is insured, our hulls are not.",
            "Trade run underway. Eyes open for raiders.",
        ],
        (_, GroupBehavior::MiningOperation) => &[
            "Mining crew on site. Lasers hot.",
            "Rich vein out here. Start the extraction cycle.",
        ],
        (_, GroupBehavior::Exploration) => &[
            "Survey team underway. Charting the outer lanes.",
            "Long-range scan started. Logging anomalies.",
        ],
        (_, GroupBehavior::Patrol) => &["Patrol wing forming up."],
        (_, GroupBehavior::Raider) => &["Weapons free. Take what you can."],
    };
    let line = lines.choose(rng).copied().unwrap_or("Forming up.");
    format!("[{}] {}", faction.display_name(), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rng::seeded;
    use uuid::Uuid;

    fn group(n: u128) -> GroupId {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut q = CommsQueue::new(8, 0.0);
        q.push(group(1), "low-a", MessagePriority::Low);
        q.push(group(2), "high-a", MessagePriority::High);
        q.push(group(3), "normal", MessagePriority::Normal);
        q.push(group(4), "high-b", MessagePriority::High);

        let order: Vec<String> = std::iter::from_fn(|| q.pop_due(0.0)).map(|m| m.text).collect();
        assert_eq!(order, vec!["high-a", "high-b", "normal", "low-a"]);
    }

    #[test]
    fn test_delivery_is_throttled() {
        let mut q = CommsQueue::new(8, 1000.0);
        q.push(group(1), "a", MessagePriority::Normal);
        q.push(group(1), "b", MessagePriority::Normal);
        assert!(q.pop_due(0.0).is_some());
        assert!(q.pop_due(500.0).is_none());
        assert!(q.pop_due(1000.0).is_some());
    }

    #[test]
    fn test_full_queue_drops_oldest_lowest() {
        let mut q = CommsQueue::new(2, 0.0);
        q.push(group(1), "low-old", MessagePriority::Low);
        q.push(group(2), "high", MessagePriority::High);
        q.push(group(3), "low-new", MessagePriority::Low);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop_due(0.0).unwrap().text, "high");
        assert_eq!(q.pop_due(0.0).unwrap().text, "low-new");
    }

    #[test]
    fn test_drop_group() {
        let mut q = CommsQueue::new(4, 0.0);
        q.push(group(1), "a", MessagePriority::Low);
        q.push(group(2), "b", MessagePriority::Low);
        q.drop_group(group(1));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_arrival_line_names_faction() {
        let mut rng = seeded(5);
        let line = arrival_line(Faction::Pirates, GroupBehavior::Raider, &mut rng);
        assert!(line.starts_with("[Crimson Pirates] "));
    }
}
