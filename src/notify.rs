use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, Id};

const CHANNEL_CAPACITY: usize = 256;

/// Per-teacher broadcast of committed events.
///
/// Collaborators that react to timetable changes (mail senders, calendar sync)
/// subscribe to a teacher and receive every event that touched that teacher's row.
pub struct NotifyHub {
    channels: DashMap<Id, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, teacher_id: Id) -> broadcast::Receiver<Event> {
        self.channels
            .entry(teacher_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan the event out to every teacher it names. No-op without listeners.
    pub fn publish(&self, event: &Event) {
        for teacher_id in event.teacher_ids() {
            if let Some(sender) = self.channels.get(&teacher_id) {
                let _ = sender.send(event.clone());
            }
        }
    }

    pub fn remove(&self, teacher_id: Id) {
        self.channels.remove(&teacher_id);
    }
}

/// JSON rendering of an event for out-of-process subscribers.
pub fn payload(event: &Event) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DayOfWeek, Span};
    use rust_decimal_macros::dec;

    fn admitted(teacher_id: Id) -> Event {
        Event::ScheduleAdmitted {
            id: 1,
            teacher_id,
            classroom_id: 2,
            group_name: "M-2".into(),
            day: DayOfWeek::Tuesday,
            span: Span::new(0, 5_400_000),
            hours: dec!(1.5),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_own_teacher_events() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(7);
        let mut other = hub.subscribe(8);

        hub.publish(&admitted(7));

        assert_eq!(rx.recv().await.unwrap(), admitted(7));
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.publish(&Event::TeacherDeleted { id: 3 });
        hub.remove(3);
    }

    #[test]
    fn payload_is_json_with_decimal_strings() {
        let json = payload(&admitted(7));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let body = &value["ScheduleAdmitted"];
        assert_eq!(body["teacher_id"], 7);
        assert_eq!(body["day"], "Tuesday");
        assert_eq!(body["hours"], "1.5");
    }
}
