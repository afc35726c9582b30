// libs/ek_types/src/error.rs
use core::fmt;

/// Type de résultat standard pour le runtime EK
pub type Result<T> = core::result::Result<T, EkError>;

/// Codes d'erreur du runtime
///
/// Les discriminants reprennent les codes négatifs historiques du firmware
/// afin de pouvoir remonter une valeur brute à travers une frontière FFI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ErrorCode {
    /// Paramètre invalide (longueur nulle, capacité nulle, ...)
    InvalidParameter = -2,

    /// Échec d'allocation dans l'arène
    AllocationFailure = -4,

    /// Composant utilisé avant son initialisation
    NotInitialized = -5,

    /// Élément introuvable (handle périmé)
    NotFound = -6,

    /// Conteneur plein
    Full = -8,

    /// Conteneur vide
    Empty = -9,

    /// Espace restant insuffisant pour l'opération
    InsufficientSpace = -10,

    /// Erreur non classée
    Unknown = -11,

    /// Référence nulle
    NullPointer = -12,

    /// Le nœud n'appartient pas à la liste indiquée
    NotOwner = -13,
}

impl ErrorCode {
    /// Code brut, compatible avec les valeurs de retour C.
    pub const fn as_raw(self) -> i8 {
        self as i8
    }
}

/// Structure d'erreur du runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EkError {
    /// Code d'erreur
    code: ErrorCode,

    /// Message descriptif
    message: Option<&'static str>,
}

impl EkError {
    /// Crée une nouvelle erreur avec un code
    pub const fn new(code: ErrorCode) -> Self {
        EkError { code, message: None }
    }

    /// Crée une erreur avec un message
    pub const fn with_message(code: ErrorCode, message: &'static str) -> Self {
        EkError {
            code,
            message: Some(message),
        }
    }

    /// Retourne le code d'erreur
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Retourne le message d'erreur
    pub fn message(&self) -> Option<&'static str> {
        self.message
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::InvalidParameter => "Invalid parameter",
            ErrorCode::AllocationFailure => "Allocation failure",
            ErrorCode::NotInitialized => "Not initialized",
            ErrorCode::NotFound => "Not found",
            ErrorCode::Full => "Container full",
            ErrorCode::Empty => "Container empty",
            ErrorCode::InsufficientSpace => "Insufficient space",
            ErrorCode::Unknown => "Unknown error",
            ErrorCode::NullPointer => "Null pointer",
            ErrorCode::NotOwner => "Node not owned by list",
        };
        f.write_str(text)
    }
}

impl fmt::Display for EkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;

        if let Some(msg) = self.message {
            write!(f, ": {}", msg)?;
        }

        Ok(())
    }
}

impl From<ErrorCode> for EkError {
    fn from(code: ErrorCode) -> Self {
        EkError::new(code)
    }
}

/// Comparaison directe `err == ErrorCode::Full` dans les tests et l'appelant.
impl PartialEq<ErrorCode> for EkError {
    fn eq(&self, other: &ErrorCode) -> bool {
        self.code == *other
    }
}
