/*!
# Sentinel DevKit - Outils de test pour le serveur web Sentinel

Bibliothèque utilisée par les tests d'intégration de `sentinel-web` :
- Arborescence temporaire logs/ config/ home/ avec helpers de remplissage
- Requêtes HTTP en mémoire contre un `Router` axum (pas de socket)
- Adresse client injectée via `ConnectInfo` pour tester la politique d'accès
*/

pub mod fixture;
pub mod request;

pub use fixture::SentinelFixture;
pub use request::{TestRequest, TestResponse};
