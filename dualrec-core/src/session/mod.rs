pub mod mixer;
pub mod orchestrator;
pub mod source_capture;
mod tick;

#[cfg(test)]
pub(crate) mod testing;
