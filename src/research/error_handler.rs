//! Error classification and user-facing failure messages.
//!
//! Classification is a substring match over a keyword table, checked in
//! table order; the first kind with a matching keyword wins. New keywords are
//! additions to the table, not code changes.

use serde::Serialize;

/// Closed set of failure causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    QuotaExceeded,
    ModelUnavailable,
    AuthFailure,
    NetworkFailure,
    Unknown,
}

/// Keywords per kind, in precedence order. Matching is case-insensitive.
const CLASSIFICATION_TABLE: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::QuotaExceeded,
        &["429", "quota", "rate limit", "resource has been exhausted"],
    ),
    (
        ErrorKind::ModelUnavailable,
        &["404", "not found", "not supported"],
    ),
    (ErrorKind::AuthFailure, &["401", "403", "api key"]),
    (
        ErrorKind::NetworkFailure,
        &["fetch", "network", "timeout", "timed out"],
    ),
];

impl ErrorKind {
    /// Classify an error message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        CLASSIFICATION_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    /// Classify any error by its display text.
    pub fn of(err: &dyn std::error::Error) -> Self {
        Self::classify(&err.to_string())
    }

    /// Only a missing/unsupported model is recovered locally, by trying the
    /// next candidate model.
    pub fn triggers_model_fallback(self) -> bool {
        self == ErrorKind::ModelUnavailable
    }
}

/// A rendered explanation of a failure, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub title: String,
    pub cause: String,
    pub remediation: String,
    /// The underlying error text, kept for support/debugging.
    pub detail: String,
}

impl ErrorReport {
    /// Render as a Markdown block.
    pub fn to_markdown(&self) -> String {
        format!(
            "## {}\n\n{}\n\n**Qué puedes hacer:** {}\n\n_Detalle técnico: {}_",
            self.title, self.cause, self.remediation, self.detail
        )
    }
}

/// Build the user-facing report for a failure message.
pub fn describe_failure(message: &str) -> ErrorReport {
    let kind = ErrorKind::classify(message);
    let (title, cause, remediation) = match kind {
        ErrorKind::QuotaExceeded => (
            "Cuota de la API excedida",
            "Se alcanzó el límite de solicitudes o la cuota disponible de la API de Gemini.",
            "Espera unos minutos antes de reintentar o revisa la cuota y facturación de tu proyecto.",
        ),
        ErrorKind::ModelUnavailable => (
            "Modelo no disponible",
            "Ninguno de los modelos configurados está disponible o admite esta operación.",
            "Actualiza la lista de modelos en la configuración con identificadores vigentes.",
        ),
        ErrorKind::AuthFailure => (
            "Error de autenticación",
            "La clave de API fue rechazada o no tiene permisos para este modelo.",
            "Verifica que GEMINI_API_KEY sea correcta y esté habilitada para la API de Gemini.",
        ),
        ErrorKind::NetworkFailure => (
            "Error de red",
            "No se pudo contactar con el servicio de Gemini.",
            "Comprueba tu conexión a internet y vuelve a enviar la consulta.",
        ),
        ErrorKind::Unknown => (
            "Error inesperado",
            "La investigación no pudo completarse.",
            "Vuelve a enviar la consulta; si el problema persiste, reformúlala.",
        ),
    };
    ErrorReport {
        kind,
        title: title.to_string(),
        cause: cause.to_string(),
        remediation: remediation.to_string(),
        detail: message.to_string(),
    }
}

/// Build the user-facing report for an error value.
pub fn describe_error(err: &dyn std::error::Error) -> ErrorReport {
    describe_failure(&err.to_string())
}
