//! Terminal rendering of the observer capabilities.
//!
//! Every handle writes into one shared status line that is redrawn in place.

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use anyhow::Result;

use crate::tracking::observers::{TextDisplay, Toggleable, Visible};

struct Field {
    label: String,
    text: String,
    visible: bool,
}

pub struct StatusLine {
    fields: RefCell<Vec<Field>>,
    out: RefCell<Box<dyn Write>>,
}

impl StatusLine {
    pub fn new(out: impl Write + 'static) -> Rc<Self> {
        Rc::new(Self {
            fields: RefCell::new(Vec::new()),
            out: RefCell::new(Box::new(out)),
        })
    }

    pub fn stderr() -> Rc<Self> {
        Self::new(io::stderr())
    }

    /// Adds a labeled field to the end of the line.
    pub fn field(self: &Rc<Self>, label: impl Into<String>) -> Rc<StatusField> {
        let mut fields = self.fields.borrow_mut();
        fields.push(Field {
            label: label.into(),
            text: String::new(),
            visible: true,
        });
        Rc::new(StatusField {
            line: self.clone(),
            index: fields.len() - 1,
        })
    }

    /// Adds a field showing whether the bound control is active.
    pub fn indicator(self: &Rc<Self>, label: impl Into<String>) -> Rc<StatusIndicator> {
        Rc::new(StatusIndicator {
            field: self.field(label),
        })
    }

    pub fn render(&self) -> String {
        self.fields
            .borrow()
            .iter()
            .filter(|field| field.visible && !field.text.is_empty())
            .map(|field| format!("{}: {}", field.label, field.text))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn redraw(&self) -> Result<()> {
        let line = self.render();
        let mut out = self.out.borrow_mut();
        write!(out, "\r\x1b[2K{line}")?;
        out.flush()?;
        Ok(())
    }

    /// Moves the cursor past the status line.
    pub fn finish(&self) -> Result<()> {
        let mut out = self.out.borrow_mut();
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    fn update(&self, index: usize, apply: impl FnOnce(&mut Field)) -> Result<()> {
        if let Some(field) = self.fields.borrow_mut().get_mut(index) {
            apply(field);
        }
        self.redraw()
    }
}

pub struct StatusField {
    line: Rc<StatusLine>,
    index: usize,
}

impl TextDisplay for StatusField {
    fn text(&self) -> Result<String> {
        Ok(self
            .line
            .fields
            .borrow()
            .get(self.index)
            .map(|field| field.text.clone())
            .unwrap_or_default())
    }

    fn set_text(&self, text: &str) -> Result<()> {
        self.line.update(self.index, |field| field.text = text.into())
    }
}

impl Visible for StatusField {
    fn set_visible(&self, visible: bool) -> Result<()> {
        self.line.update(self.index, |field| field.visible = visible)
    }
}

pub struct StatusIndicator {
    field: Rc<StatusField>,
}

impl Toggleable for StatusIndicator {
    fn set_active(&self, active: bool) -> Result<()> {
        self.field
            .set_text(if active { "tracking" } else { "idle" })
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io::Write, rc::Rc};

    use anyhow::Result;

    use crate::tracking::observers::{TextDisplay, Toggleable, Visible};

    use super::StatusLine;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fields_render_in_order() -> Result<()> {
        let buffer = SharedBuffer::default();
        let line = StatusLine::new(buffer.clone());
        let state = line.indicator("state");
        let elapsed = line.field("elapsed");
        let money = line.field("earned");

        state.set_active(true)?;
        elapsed.set_text("00:00:03")?;
        money.set_text("$1.00")?;
        money.set_visible(false)?;

        assert_eq!(line.render(), "state: tracking | elapsed: 00:00:03");
        assert_eq!(elapsed.text()?, "00:00:03");
        let written = String::from_utf8(buffer.0.borrow().clone())?;
        assert!(written.ends_with("state: tracking | elapsed: 00:00:03"));
        Ok(())
    }

    #[test]
    fn test_empty_fields_are_skipped() -> Result<()> {
        let line = StatusLine::new(SharedBuffer::default());
        let task = line.field("task");
        let _empty = line.field("stack");
        task.set_text("Review (3)")?;
        assert_eq!(line.render(), "task: Review (3)");
        Ok(())
    }
}
