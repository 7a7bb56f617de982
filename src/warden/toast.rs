/// What invoking the toast does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastAction {
    UndoEntry(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UndoToast {
    #[default]
    Idle,
    Armed {
        message: String,
        action: ToastAction,
        deadline_ms: u64,
    },
}

impl UndoToast {
    /// Replaces whatever is showing; the newest change owns the toast.
    pub fn arm(&mut self, message: impl Into<String>, action: ToastAction, now_ms: u64, hold_ms: u64) {
        *self = Self::Armed {
            message: message.into(),
            action,
            deadline_ms: now_ms.saturating_add(hold_ms),
        };
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Armed { message, .. } => Some(message.as_str()),
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed { .. })
    }

    /// Takes the action if it is still inside its deadline; the toast goes
    /// idle either way.
    pub fn invoke(&mut self, now_ms: u64) -> Option<ToastAction> {
        match std::mem::take(self) {
            Self::Armed {
                action,
                deadline_ms,
                ..
            } if now_ms <= deadline_ms => Some(action),
            _ => None,
        }
    }

    /// Timer callback. Only clears the toast that scheduled it.
    pub fn expire(&mut self, scheduled_message: &str, now_ms: u64) -> bool {
        let due = match self {
            Self::Armed {
                message,
                deadline_ms,
                ..
            } => message.as_str() == scheduled_message && now_ms >= *deadline_ms,
            Self::Idle => false,
        };
        if due {
            *self = Self::Idle;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: u64 = 4_000;

    #[test]
    fn invoke_within_deadline_returns_action_once() {
        let mut toast = UndoToast::default();
        toast.arm("Set .json to AppB", ToastAction::UndoEntry("e1".into()), 1_000, HOLD);
        assert_eq!(toast.message(), Some("Set .json to AppB"));
        assert_eq!(toast.invoke(2_000), Some(ToastAction::UndoEntry("e1".into())));
        assert_eq!(toast, UndoToast::Idle);
        assert_eq!(toast.invoke(2_001), None);
    }

    #[test]
    fn invoke_after_deadline_is_a_no_op() {
        let mut toast = UndoToast::default();
        toast.arm("x", ToastAction::UndoEntry("e1".into()), 1_000, HOLD);
        assert_eq!(toast.invoke(5_001), None);
        assert!(!toast.is_armed());
    }

    #[test]
    fn stale_timer_leaves_newer_toast_alone() {
        let mut toast = UndoToast::default();
        toast.arm("first", ToastAction::UndoEntry("e1".into()), 0, HOLD);
        toast.arm("second", ToastAction::UndoEntry("e2".into()), 3_000, HOLD);

        assert!(!toast.expire("first", 4_000));
        assert_eq!(toast.message(), Some("second"));

        assert!(!toast.expire("second", 6_999));
        assert!(toast.expire("second", 7_000));
        assert_eq!(toast, UndoToast::Idle);
    }
}
