//! Success-story gallery.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStudy {
    #[serde(alias = "nombre")]
    pub name: String,
    pub url: String,
}

impl CaseStudy {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Gallery shown when nothing is configured.
pub fn default_cases() -> Vec<CaseStudy> {
    [
        ("TECH", "https://galaxiaglamour.com"),
        ("Concepto Movil - APPS", "https://tu-dominio/casos/concepto-apps"),
        ("Concepto Movil - TECH", "https://tu-dominio/casos/concepto-tech"),
        ("DeAcero", "https://tu-dominio/casos/deacero"),
        ("Flecha Amarilla", "https://tu-dominio/casos/flecha-amarilla"),
        ("GNP", "https://tu-dominio/casos/gnp"),
        ("Kosmos", "https://tu-dominio/casos/kosmos"),
        ("Metalsa", "https://tu-dominio/casos/metalsa"),
        ("Waldo’s", "https://tu-dominio/casos/waldos"),
        (
            "Crédito Maestro (Financiera Maestra)",
            "https://tu-dominio/casos/credito-maestro",
        ),
    ]
    .into_iter()
    .map(|(name, url)| CaseStudy::new(name, url))
    .collect()
}

/// Gallery state: the list and at most one open case.
#[derive(Debug, Clone)]
pub struct CaseGallery {
    cases: Vec<CaseStudy>,
    open: Option<usize>,
}

impl CaseGallery {
    pub fn new(cases: Vec<CaseStudy>) -> Self {
        Self { cases, open: None }
    }

    pub fn cases(&self) -> &[CaseStudy] {
        &self.cases
    }

    /// Open the case at 1-based `number`. Replaces any open case.
    pub fn open(&mut self, number: usize) -> Option<&CaseStudy> {
        let index = number.checked_sub(1).filter(|i| *i < self.cases.len())?;
        self.open = Some(index);
        self.cases.get(index)
    }

    /// Open the first case whose name contains `query`, ignoring case.
    pub fn open_by_name(&mut self, query: &str) -> Option<&CaseStudy> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        let index = self
            .cases
            .iter()
            .position(|c| c.name.to_lowercase().contains(&query))?;
        self.open = Some(index);
        self.cases.get(index)
    }

    pub fn current(&self) -> Option<&CaseStudy> {
        self.open.and_then(|i| self.cases.get(i))
    }

    /// Returns whether a case was open.
    pub fn close(&mut self) -> bool {
        self.open.take().is_some()
    }
}
