use crate::locale::Locale;

pub const QUERY_PLACEHOLDER: &str = "{query}";

const SPANISH_TEMPLATE: &str = r#"{query}. Responde en español de forma clara y útil.
Incluye ejemplos si sirven y TERMINA tu texto con una pregunta breve para continuar.

Al final de tu respuesta normal, añade un BLOQUE JSON en UNA sola línea, delimitado por:
<!--JSON_START-->{...}<!--JSON_END-->

Ese JSON debe tener esta forma:
{"gancho":"Pregunta breve para continuar","opciones":[
  {"id":"pasos","titulo":"Ver pasos concretos","query_sugerida":"Muéstrame los pasos para ..."},
  {"id":"docs","titulo":"Ver documentos relacionados","query_sugerida":"Muéstrame documentos sobre ..."}
]}

Si no hay buenas opciones, usa {"gancho":"¿Quieres profundizar en algo?","opciones":[]} y NO agregues saltos de línea dentro del JSON."#;

const ENGLISH_TEMPLATE: &str = r#"{query}. Answer in English, clearly and helpfully.
Include examples when useful and END your text with a short question to continue.

After your normal answer, append a JSON BLOCK on ONE single line, delimited by:
<!--JSON_START-->{...}<!--JSON_END-->

That JSON must have this shape:
{"gancho":"Short question to continue","opciones":[
  {"id":"steps","titulo":"See concrete steps","query_sugerida":"Show me the steps to ..."},
  {"id":"docs","titulo":"See related documents","query_sugerida":"Show me documents about ..."}
]}

If there are no good options, use {"gancho":"Want to go deeper on anything?","opciones":[]} and do NOT add line breaks inside the JSON."#;

/// Instruction wrapped around every query sent to the retrieval backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Custom template. Without a `{query}` placeholder the query is put
    /// in front of the template text.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn for_locale(locale: Locale) -> Self {
        match locale {
            Locale::Es => Self::new(SPANISH_TEMPLATE),
            Locale::En => Self::new(ENGLISH_TEMPLATE),
        }
    }

    pub fn wrap(&self, query: &str) -> String {
        if self.template.contains(QUERY_PLACEHOLDER) {
            self.template.replacen(QUERY_PLACEHOLDER, query, 1)
        } else {
            format!("{query}\n\n{}", self.template)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_locale(Locale::default())
    }
}
