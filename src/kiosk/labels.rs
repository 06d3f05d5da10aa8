//! Fixed on-screen copy per locale.

use crate::locale::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    pub locale: Locale,
    pub welcome: &'static str,
    pub welcome_title: &'static str,
    pub welcome_subtitle: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub role: &'static str,
    pub invalid_email: &'static str,
    pub required_field: &'static str,
    pub saving: &'static str,
    pub save_failed: &'static str,

    pub intro_title: &'static str,
    pub intro_body: &'static str,
    pub intro_continue: &'static str,

    pub prev: &'static str,
    pub next: &'static str,
    pub submit: &'static str,
    pub missing_title: &'static str,
    pub missing_body: &'static str,
    pub select_one: &'static str,
    pub long_placeholder: &'static str,
    pub answer_hint: &'static str,
    pub survey_saved: &'static str,

    pub menu_header: &'static str,
    pub menu_survey: &'static str,
    pub menu_agent: &'static str,
    pub menu_cases: &'static str,
    pub menu_usage: &'static str,

    pub chat_thinking: &'static str,
    pub follow_ups: &'static str,
    pub references: &'static str,

    pub cases_title: &'static str,
    pub close: &'static str,
    pub menu: &'static str,
    pub restart: &'static str,
    pub idle_title: &'static str,
    pub idle_continue: &'static str,

    pub unknown_command: &'static str,
    pub suggestions: &'static str,
    pub not_here: &'static str,
}

static ES: Labels = Labels {
    locale: Locale::Es,
    welcome: "¡Bienvenido!",
    welcome_title: "Empecemos con tus datos",
    welcome_subtitle: "Solo tomará un momento.",
    name: "Tu nombre y apellido",
    email: "Correo electrónico de contacto",
    role: "Tu puesto o rol",
    invalid_email: "Escribe un correo válido.",
    required_field: "Este campo es obligatorio.",
    saving: "Guardando…",
    save_failed: "No pudimos guardar tus datos. Presiona Enter para reintentar.",

    intro_title: "Encuesta de madurez digital de Grupo Bimbo",
    intro_body: "La encuesta es anónima, tus respuestas serán únicamente utilizadas para mejorar la experiencia.",
    intro_continue: "Presiona Enter para comenzar.",

    prev: "Anterior",
    next: "Siguiente",
    submit: "Enviar respuestas",
    missing_title: "Respuestas faltantes",
    missing_body: "Por favor completa las preguntas marcadas antes de continuar.",
    select_one: "Selecciona una opción.",
    long_placeholder: "Escribe tu respuesta…",
    answer_hint: "Responde con: <id> <número de opción o texto>",
    survey_saved: "¡Gracias! Tus respuestas fueron guardadas.",

    menu_header: "Cuéntanos, ¿qué quieres descubrir primero?",
    menu_survey: "Encuesta de madurez digital",
    menu_agent: "Platica con un Agente AI",
    menu_cases: "Casos de éxito",
    menu_usage: "Guía de buen uso de IA",

    chat_thinking: "Pensando…",
    follow_ups: "Sugerencias",
    references: "Referencias",

    cases_title: "Conoce los casos de éxito con AI en México",
    close: "Cerrar",
    menu: "Menú",
    restart: "Reiniciar",
    idle_title: "Inactividad detectada",
    idle_continue: "Toca, haz clic o presiona una tecla para continuar.",

    unknown_command: "Comando desconocido",
    suggestions: "¿Quisiste decir",
    not_here: "Ese comando no está disponible aquí.",
};

static EN: Labels = Labels {
    locale: Locale::En,
    welcome: "Welcome!",
    welcome_title: "Let's start with your information",
    welcome_subtitle: "It will only take a moment.",
    name: "Your full name",
    email: "Contact email",
    role: "Your position or role",
    invalid_email: "Please enter a valid email.",
    required_field: "This field is required.",
    saving: "Saving…",
    save_failed: "We could not save your details. Press Enter to try again.",

    intro_title: "Digital maturity survey of Grupo Bimbo",
    intro_body: "The survey is anonymous, your responses will be used only to improve the experience.",
    intro_continue: "Press Enter to begin.",

    prev: "Back",
    next: "Next",
    submit: "Submit answers",
    missing_title: "Missing answers",
    missing_body: "Please complete the marked questions before continuing.",
    select_one: "Select an option.",
    long_placeholder: "Type your answer…",
    answer_hint: "Answer with: <id> <option number or text>",
    survey_saved: "Thank you! Your answers were saved.",

    menu_header: "Tell us, what would you like to explore first?",
    menu_survey: "Digital maturity survey",
    menu_agent: "Chat with an AI Agent",
    menu_cases: "Success stories",
    menu_usage: "AI usage guidelines",

    chat_thinking: "Thinking…",
    follow_ups: "Suggestions",
    references: "References",

    cases_title: "Explore success stories with AI in Mexico",
    close: "Close",
    menu: "Menu",
    restart: "Restart",
    idle_title: "Inactivity detected",
    idle_continue: "Tap, click, or press a key to continue.",

    unknown_command: "Unknown command",
    suggestions: "Did you mean",
    not_here: "That command is not available here.",
};

impl Labels {
    pub fn for_locale(locale: Locale) -> &'static Labels {
        match locale {
            Locale::Es => &ES,
            Locale::En => &EN,
        }
    }

    pub fn idle_countdown(&self, seconds: u64) -> String {
        if self.locale == Locale::Es {
            format!("Serás redirigido al inicio en {seconds} segundos…")
        } else {
            format!("You will be redirected to the home in {seconds} seconds…")
        }
    }

    pub fn section(&self, index: usize, total: usize) -> String {
        if self.locale == Locale::Es {
            format!("Sección {index} de {total}")
        } else {
            format!("Section {index} of {total}")
        }
    }

    pub fn progress(&self, answered: usize, total: usize) -> String {
        if self.locale == Locale::Es {
            format!("Progreso: {answered}/{total}")
        } else {
            format!("Progress: {answered}/{total}")
        }
    }
}
