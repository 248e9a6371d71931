//! Candidate ordering for model fallbacks

use std::collections::HashSet;
use log::debug;

/// Ordered, duplicate-free models to try for one request.
/// Position 0 is always the requested (or default) model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList
{   models: Vec<String>
}

impl CandidateList
{   /// Requested model first, then the task's catalog fallbacks.
    /// A blank requested model counts as not given.
    pub fn build(
      task: &crate::Task
    , requested: Option<&str>
    ) -> Self
    {   let ranked = crate::catalog::recommended_models(task);
        let requested = requested
          .map(str::trim)
          .filter(|m| !m.is_empty())
          .or_else(|| ranked.first().copied());

        let mut seen = HashSet::new();
        let models: Vec<String> = requested
          .into_iter()
          .chain(ranked.iter().copied())
          .filter(|m| seen.insert(*m))
          .map(str::to_string)
          .collect();

        debug!(
          "Built candidate list for {} with {} models",
          task, models.len()
        );
        CandidateList { models }
    }

    /// The model the caller is considered to have asked for
    pub fn requested(&self) -> &str
    {   self.models.first().map(String::as_str).unwrap_or_default()
    }

    pub fn models(&self) -> &[String]
    {   &self.models
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String>
    {   self.models.iter()
    }

    pub fn len(&self) -> usize
    {   self.models.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.models.is_empty()
    }
}

impl<'a> IntoIterator for &'a CandidateList
{   type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter
    {   self.models.iter()
    }
}
