//! Home page figures.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::declaration::{Declaration, Sex};
use crate::error::Result;
use crate::user::{Status, UserQuery};

const RECENT: usize = 5;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total: usize,
    pub recent: Vec<Declaration>,
    pub active_users: usize,
    pub boys: usize,
    pub girls: usize,
}

/// Most recently declared first. Undated declarations come last.
fn most_recent(mut declarations: Vec<Declaration>, count: usize) -> Vec<Declaration> {
    declarations.sort_by(|a, b| b.declared_at.cmp(&a.declared_at));
    declarations.truncate(count);
    declarations
}

pub async fn handler(State(state): State<AppState>) -> Result<Json<Dashboard>> {
    let declarations = state.declarations().list().await?;
    let users = state.users().list(&UserQuery::default()).await?;

    let count = |sex: Sex| declarations.iter().filter(|d| d.child.sex == Some(sex)).count();
    let boys = count(Sex::Male);
    let girls = count(Sex::Female);

    Ok(Json(Dashboard {
        total: declarations.len(),
        active_users: users.iter().filter(|u| u.status == Status::Active).count(),
        boys,
        girls,
        recent: most_recent(declarations, RECENT),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::backend::{Document, DocumentStore};
    use crate::declaration::COLLECTION;
    use crate::{app, make_request, router};

    fn declared(at: Option<&str>) -> Declaration {
        Declaration {
            declared_at: at.map(str::to_owned),
            ..Default::default()
        }
    }

    #[test]
    fn test_most_recent() {
        let recent = most_recent(
            vec![
                declared(Some("2024-01-01T00:00:00.000Z")),
                declared(None),
                declared(Some("2024-03-01T00:00:00.000Z")),
                declared(Some("2024-02-01T00:00:00.000Z")),
            ],
            3,
        );

        let dates: Vec<Option<&str>> = recent.iter().map(|d| d.declared_at.as_deref()).collect();
        assert_eq!(
            dates,
            vec![
                Some("2024-03-01T00:00:00.000Z"),
                Some("2024-02-01T00:00:00.000Z"),
                Some("2024-01-01T00:00:00.000Z"),
            ]
        );
    }

    #[tokio::test]
    async fn test_dashboard_handler() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let mut declaration = declared(Some("2024-03-01T00:00:00.000Z"));
        declaration.child.sex = Some(Sex::Female);
        state.declarations().insert(&declaration).await.unwrap();

        let response = make_request(Some(&token), app(state), Method::GET, "/dashboard", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Dashboard = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.total, 1);
        assert_eq!(body.girls, 1);
        assert_eq!(body.active_users, 1);
        assert_eq!(body.recent.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_declaration_is_skipped() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let mut good = Document::new();
        good.insert("nom".into(), "Rabe".into());
        state.memory.create(COLLECTION, good).await.unwrap();
        let mut bad = Document::new();
        bad.insert("nom".into(), 12.into());
        state.memory.create(COLLECTION, bad).await.unwrap();

        let response = make_request(Some(&token), app(state), Method::GET, "/dashboard", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Dashboard = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.total, 1);
        assert_eq!(body.recent[0].child.surname, "Rabe");
    }
}
