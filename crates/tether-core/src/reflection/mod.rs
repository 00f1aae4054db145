//! End-of-session reflection: the `SummarizationProvider` port and the
//! generator that turns a transcript into one stored insight.

pub mod box_summarizer;
pub mod generator;
pub mod summarizer;
