//! RcDoc-based pretty-printer with termcolor annotations for expressions.
//!
//! Expressions are laid out in call notation. Calls that do not fit in the
//! available width are broken after the opening parenthesis and between
//! arguments, with nested arguments indented. The plain output parses back to
//! the same expression.
//!
//! Both flat expressions (through [`Expression::display`]) and instantiated
//! trees ([`Node`]) can be printed.
use std::{
    fmt,
    io::{self, Write},
};

use pretty::{FmtWrite, RcDoc, RenderAnnotated};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::{expr::ExpressionFmt, node::Node};

/// Styles used to annotate parts of the pretty-printed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Punct,
    /// Parentheses are colored by nesting depth so matching pairs share a color.
    Paren(u8),
    Primitive,
    Terminal,
    /// Placeholders for missing or unknown elements of a malformed expression.
    Error,
}

impl Style {
    fn to_color_spec(self) -> ColorSpec {
        let mut s = ColorSpec::new();
        match self {
            Style::Punct => {
                s.set_dimmed(true);
            }
            Style::Paren(depth) => {
                let fg = match depth % 6 {
                    0 => Color::Blue,
                    1 => Color::Green,
                    2 => Color::White,
                    3 => Color::Yellow,
                    4 => Color::Red,
                    _ => Color::Magenta,
                };
                s.set_fg(Some(fg)).set_dimmed(true);
            }
            Style::Primitive => {
                s.set_fg(Some(Color::Cyan)).set_bold(true);
            }
            Style::Terminal => {
                s.set_fg(Some(Color::Green)).set_bold(true);
            }
            Style::Error => {
                s.set_fg(Some(Color::Red)).set_bold(true);
            }
        }
        s
    }
}

fn lparen(depth: u8) -> RcDoc<'static, Style> {
    RcDoc::as_string("(").annotate(Style::Paren(depth))
}

fn rparen(depth: u8) -> RcDoc<'static, Style> {
    RcDoc::as_string(")").annotate(Style::Paren(depth))
}

fn call(name: RcDoc<'static, Style>, args: Vec<RcDoc<'static, Style>>, depth: u8) -> RcDoc<'static, Style> {
    if args.is_empty() {
        return name;
    }

    let sep = RcDoc::as_string(",")
        .annotate(Style::Punct)
        .append(RcDoc::line());
    name.append(lparen(depth))
        .append(
            RcDoc::line_()
                .append(RcDoc::intersperse(args, sep))
                .nest(2),
        )
        .append(RcDoc::line_())
        .append(rparen(depth))
        .group()
}

fn name_doc(name: &str, terminal: bool) -> RcDoc<'static, Style> {
    let style = if terminal {
        Style::Terminal
    } else {
        Style::Primitive
    };
    RcDoc::as_string(name).annotate(style)
}

fn expr_doc<T>(fmt: &ExpressionFmt<'_, T>, pos: &mut usize, depth: u8) -> RcDoc<'static, Style> {
    let Some(id) = fmt.expr.as_slice().get(*pos).copied() else {
        return RcDoc::as_string("?").annotate(Style::Error);
    };
    *pos += 1;

    let Some(primitive) = fmt.pset.get(id) else {
        return RcDoc::as_string(format!("<unknown {id}>")).annotate(Style::Error);
    };
    let args = (0..primitive.arity())
        .map(|_| expr_doc(fmt, pos, depth.wrapping_add(1)))
        .collect();
    call(name_doc(primitive.name(), primitive.is_terminal()), args, depth)
}

fn node_doc<T>(node: &Node<T>, depth: u8) -> RcDoc<'static, Style> {
    let args = node
        .children()
        .iter()
        .map(|child| node_doc(child, depth.wrapping_add(1)))
        .collect();
    call(name_doc(node.name(), node.primitive().is_terminal()), args, depth)
}

// A writer that maps Style annotations to termcolor ColorSpec on a WriteColor sink.
struct ColorWriter<'w, W: WriteColor + Write> {
    out: &'w mut W,
}

impl<'a, W: WriteColor + Write> RenderAnnotated<'a, Style> for ColorWriter<'_, W> {
    fn push_annotation(&mut self, ann: &'a Style) -> io::Result<()> {
        self.out.set_color(&ann.to_color_spec())
    }
    fn pop_annotation(&mut self) -> io::Result<()> {
        self.out.reset()
    }
}

impl<W: WriteColor + Write> pretty::Render for ColorWriter<'_, W> {
    type Error = io::Error;
    fn write_str(&mut self, s: &str) -> io::Result<usize> {
        self.out.write_all(s.as_bytes())?;
        Ok(s.len())
    }
    fn write_str_all(&mut self, s: &str) -> io::Result<()> {
        self.out.write_all(s.as_bytes())
    }
    fn fail_doc(&self) -> Self::Error {
        io::Error::other("render failed")
    }
}

fn render_to<W: WriteColor + Write>(
    doc: &RcDoc<'_, Style>,
    width: usize,
    out: &mut W,
) -> io::Result<()> {
    let mut cw = ColorWriter { out };
    doc.render_raw(width, &mut cw)
}

/// Width of the terminal, or 80 if it cannot be determined.
pub fn terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Pretty-printing conveniences for expressions and instantiated trees.
pub trait PrettyExpression {
    /// Build an RcDoc representation with style annotations.
    fn pretty_doc(&self) -> RcDoc<'static, Style>;

    /// Render with colors to any termcolor writer at the given width.
    fn pretty_render_to<W: WriteColor + Write>(&self, width: usize, out: &mut W) -> io::Result<()> {
        render_to(&self.pretty_doc(), width, out)
    }

    /// Print to stdout with colors (TTY-aware) at the terminal's width,
    /// followed by a newline.
    fn pretty_print(&self) -> io::Result<()> {
        let stdout = StandardStream::stdout(ColorChoice::Auto);
        let mut stdout = stdout.lock();
        self.pretty_render_to(terminal_width(), &mut stdout)?;
        writeln!(stdout)
    }

    /// Write without colors into any `fmt::Write` sink at the given width.
    fn pretty_write<W: fmt::Write>(&self, width: usize, out: &mut W) -> fmt::Result {
        self.pretty_doc().render_raw(width, &mut FmtWrite::new(out))
    }

    /// Format into a plain string (no colors) at the given width.
    fn pretty_string(&self, width: usize) -> String {
        let mut buf = String::new();
        self.pretty_write(width, &mut buf)
            .expect("writing to a String cannot fail");
        buf
    }
}

impl<T> PrettyExpression for ExpressionFmt<'_, T> {
    fn pretty_doc(&self) -> RcDoc<'static, Style> {
        let mut pos = 0;
        let doc = expr_doc(self, &mut pos, 0);
        let rest = &self.expr.as_slice()[pos.min(self.expr.len())..];
        if rest.is_empty() {
            return doc;
        }

        let trailing = rest
            .iter()
            .map(|id| self.pset.get(*id).map_or("?", |p| p.name()))
            .collect::<Vec<_>>()
            .join(", ");
        doc.append(RcDoc::space())
            .append(RcDoc::as_string(format!("[{trailing}]")).annotate(Style::Error))
    }
}

impl<T> PrettyExpression for Node<T> {
    fn pretty_doc(&self) -> RcDoc<'static, Style> {
        node_doc(self, 0)
    }
}
