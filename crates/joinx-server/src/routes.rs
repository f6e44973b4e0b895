//! # HTTP Route Handlers
//!
//! `POST /join-search` runs one search per request:
//!
//! 1. **Seed**: map the request onto a relation store and join constraints.
//! 2. **Configure**: pick the search configuration and cost model (request overrides
//!    win over the server defaults) and wire up the leading directive.
//! 3. **Search**: run the level-by-level join search.
//! 4. **Render**: walk the cheapest paths into the response tree.
//!
//! ## Error Handling
//!
//! - 400 Bad Request: the problem is malformed (unknown names, duplicate names,
//!   inconsistent special joins)
//! - 422 Unprocessable Entity: the problem is well-formed but no join order exists
//!   under its constraints, or the search hit a resource limit
//! - 500 Internal Server Error: the final relation has no path to render

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use joinx_core::relation::PlanTree;
use joinx_core::search::JoinSearch;
use joinx_paths::builder::DefaultPathBuilder;

use crate::problem::{JoinProblemRequest, JoinSearchResponse, JoinTreeNode};
use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// POST /join-search
pub async fn join_search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinProblemRequest>,
) -> Result<Json<JoinSearchResponse>, (StatusCode, String)> {
    run_join_search(&state, &req).map(Json)
}

fn run_join_search(
    state: &AppState,
    req: &JoinProblemRequest,
) -> Result<JoinSearchResponse, (StatusCode, String)> {
    let model = req.cost_model.clone().unwrap_or_else(|| state.cost_model.clone());
    let problem = req
        .seed(&model)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let config = req.config.clone().unwrap_or_else(|| state.config.search.clone());
    let leading = Arc::new(problem.leading);
    let paths = DefaultPathBuilder::new(model).with_leading(leading.clone(), config.disable_cost);

    let mut search = JoinSearch::new(problem.store, problem.constraints, Arc::new(paths), config)
        .with_hints(leading)
        .with_translator(Arc::new(problem.appinfos))
        .with_bound_merger(state.bound_merger.clone());

    let root = search
        .search(problem.initial.len(), &problem.initial)
        .map_err(|e| {
            warn!("join search failed: {}", e);
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        })?;

    let tree = search.store().best_tree(root).ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "final join relation has no path".to_string(),
        )
    })?;
    debug!("chosen join tree:\n{}", tree.display(0));

    Ok(JoinSearchResponse {
        cost: tree.cost().total,
        tree: render(&tree),
        level_sizes: search.level_sizes(),
    })
}

fn render(tree: &PlanTree) -> JoinTreeNode {
    match tree {
        PlanTree::Leaf { name, kind, cost, .. } => JoinTreeNode::Leaf {
            relation: name.clone(),
            path: format!("{:?}", kind),
            cost: cost.total,
        },
        PlanTree::Join {
            kind,
            join_kind,
            cost,
            outer,
            inner,
            ..
        } => JoinTreeNode::Join {
            path: format!("{:?}", kind),
            join_type: join_kind.to_string(),
            cost: cost.total,
            outer: Box::new(render(outer)),
            inner: Box::new(render(inner)),
        },
    }
}
