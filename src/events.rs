/// Messages delivered to the owning event loop. Background loops never
/// mutate shared state; they send one of these instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A line typed on standard input.
    Line(String),
    /// A finalized transcript from the recognition loop.
    Transcript(String),
    /// A background loop wants something printed (device errors, etc.).
    Notice(String),
    /// Standard input closed; the run loop should wind down.
    Eof,
}
