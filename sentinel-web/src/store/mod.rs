/**
 * MONITOR STORE - Accès aux fichiers plats de l'agent Sentinel
 *
 * RÔLE :
 * Interface étroite entre le serveur web et les fichiers écrits par l'agent
 * (status.json, history.jsonl, actions.jsonl, alerts/, sentinel.conf).
 * Les readers et le dispatcher d'actions dépendent de ce trait, jamais des chemins bruts.
 *
 * FONCTIONNEMENT :
 * - Resource = nom logique d'un fichier (status, history, actions, config)
 * - MonitorStore = lecture JSON / lignes / texte, écriture texte, ajout de ligne
 * - Alertes = listing du dossier alerts/ (*.json, *.txt) avec mtime
 * - Aucun cache : chaque appel relit le disque
 */

pub mod fs;

pub use fs::FsStore;

use serde_json::Value;
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Fichiers logiques exposés par l'agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Status,
    History,
    Actions,
    Config,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Resource::Status => "status",
            Resource::History => "history",
            Resource::Actions => "actions",
            Resource::Config => "config",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Json,
    Text,
}

/// Entrée du dossier d'alertes, avant lecture du contenu
#[derive(Debug, Clone)]
pub struct AlertEntry {
    pub name: String,
    pub kind: AlertKind,
    pub modified: SystemTime,
}

/// Interface commune d'accès aux données de l'agent
pub trait MonitorStore: Send + Sync {
    /// Objet JSON unique (ex: status.json)
    fn read_json(&self, resource: Resource) -> Result<Value, StoreError>;

    /// Lignes non vides d'un fichier JSONL, dans l'ordre du fichier
    fn read_lines(&self, resource: Resource) -> Result<Vec<String>, StoreError>;

    /// Contenu texte brut (ex: sentinel.conf)
    fn read_text(&self, resource: Resource) -> Result<String, StoreError>;

    /// Remplace le contenu complet, sans verrou (dernier écrivain gagne)
    fn write_text(&self, resource: Resource, text: &str) -> Result<(), StoreError>;

    /// Ajoute un enregistrement JSON sur une nouvelle ligne
    fn append_line(&self, resource: Resource, record: &Value) -> Result<(), StoreError>;

    /// Fichiers *.json / *.txt du dossier d'alertes, ordre non défini.
    /// Dossier absent = liste vide.
    fn list_alerts(&self) -> Result<Vec<AlertEntry>, StoreError>;

    fn read_alert(&self, entry: &AlertEntry) -> Result<String, StoreError>;
}
