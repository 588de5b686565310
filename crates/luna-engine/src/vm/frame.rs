//! Call frames and traceback rendering.

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Top level of a loaded chunk
    Main { chunk: Rc<str> },
    /// Script function defined at `defined_at` in `chunk`
    Script { chunk: Rc<str>, defined_at: u32 },
    /// Host function
    Native,
}

/// One active call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Name of the callee as seen at the call site
    pub name: Option<Rc<str>>,
    pub kind: FrameKind,
    /// Line currently executing (script frames only)
    pub line: u32,
}

impl CallFrame {
    pub fn is_native(&self) -> bool {
        matches!(self.kind, FrameKind::Native)
    }

    pub fn chunk(&self) -> Option<&Rc<str>> {
        match &self.kind {
            FrameKind::Main { chunk } | FrameKind::Script { chunk, .. } => Some(chunk),
            FrameKind::Native => None,
        }
    }

    /// `chunk:line` for script frames, `[native]` otherwise.
    pub fn location(&self) -> String {
        match self.chunk() {
            Some(chunk) => format!("{}:{}", chunk, self.line),
            None => "[native]".to_string(),
        }
    }

    /// What is running in this frame, as printed by tracebacks.
    pub fn what(&self) -> String {
        match (&self.kind, &self.name) {
            (FrameKind::Main { .. }, _) => "in main chunk".to_string(),
            (_, Some(name)) => format!("in function '{}'", name),
            (FrameKind::Script { chunk, defined_at }, None) => {
                format!("in function <{}:{}>", chunk, defined_at)
            }
            (FrameKind::Native, None) => "?".to_string(),
        }
    }
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location(), self.what())
    }
}

/// Render `message` followed by the frames, innermost first, skipping the
/// `level` innermost ones.
pub fn render_traceback(frames: &[CallFrame], message: Option<&str>, level: usize) -> String {
    let mut out = String::new();
    if let Some(message) = message {
        out.push_str(message);
        out.push('\n');
    }
    out.push_str("stack traceback:");
    for frame in frames.iter().rev().skip(level) {
        out.push_str("\n\t");
        out.push_str(&frame.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames() -> Vec<CallFrame> {
        vec![
            CallFrame {
                name: None,
                kind: FrameKind::Main {
                    chunk: "main.lua".into(),
                },
                line: 9,
            },
            CallFrame {
                name: Some("speak".into()),
                kind: FrameKind::Script {
                    chunk: "main.lua".into(),
                    defined_at: 2,
                },
                line: 3,
            },
            CallFrame {
                name: Some("error".into()),
                kind: FrameKind::Native,
                line: 0,
            },
        ]
    }

    #[test]
    fn test_traceback_lists_innermost_first() {
        let trace = render_traceback(&frames(), Some("boom"), 0);
        assert_eq!(
            trace,
            "boom\nstack traceback:\n\t[native]: in function 'error'\n\tmain.lua:3: in function 'speak'\n\tmain.lua:9: in main chunk"
        );
    }

    #[test]
    fn test_traceback_level_skips_frames() {
        let trace = render_traceback(&frames(), None, 1);
        assert!(trace.starts_with("stack traceback:\n\tmain.lua:3"));
    }

    #[test]
    fn test_anonymous_function_frame() {
        let frame = CallFrame {
            name: None,
            kind: FrameKind::Script {
                chunk: "x.lua".into(),
                defined_at: 4,
            },
            line: 5,
        };
        assert_eq!(frame.to_string(), "x.lua:5: in function <x.lua:4>");
    }
}
