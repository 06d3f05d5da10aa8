//! Welcome form: one field per line.

use crate::store::ProfileInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomeField {
    Name,
    Email,
    Role,
}

/// Why a value was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Required,
    InvalidEmail,
}

/// Field-by-field entry of the visitor's details.
#[derive(Debug, Clone, Default)]
pub struct WelcomeForm {
    name: String,
    email: String,
    role: String,
}

impl WelcomeForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first field still empty, `None` once the form is complete.
    pub fn pending_field(&self) -> Option<WelcomeField> {
        if self.name.is_empty() {
            Some(WelcomeField::Name)
        } else if self.email.is_empty() {
            Some(WelcomeField::Email)
        } else if self.role.is_empty() {
            Some(WelcomeField::Role)
        } else {
            None
        }
    }

    /// Fill the pending field with `value`.
    pub fn fill(&mut self, value: &str) -> Result<(), FieldError> {
        let value = value.trim();
        let Some(field) = self.pending_field() else {
            return Ok(());
        };
        if value.is_empty() {
            return Err(FieldError::Required);
        }
        match field {
            WelcomeField::Name => self.name = value.to_string(),
            WelcomeField::Email => {
                if !is_plausible_email(value) {
                    return Err(FieldError::InvalidEmail);
                }
                self.email = value.to_string();
            }
            WelcomeField::Role => self.role = value.to_string(),
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.pending_field().is_none()
    }

    /// Profile fields once every field is filled.
    pub fn to_input(&self) -> Option<ProfileInput> {
        self.is_complete().then(|| ProfileInput {
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        })
    }
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !value.contains(' '),
        None => false,
    }
}
