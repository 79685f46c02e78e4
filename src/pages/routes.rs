use serde::Serialize;
use serde_json::json;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    acl::parse_prefix,
    data_service::{DataService, Query, Table, fetch_all, insert_row, update_row},
    error::{AppError, Result},
    models::{NewRouteRequest, Node, Route},
};

/// Shown for routes whose node is not visible (or no longer exists).
pub const UNKNOWN_NODE: &str = "Unknown Node";

#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct RouteView {
    pub route: Route,
    pub node_name: String,
}

#[derive(Serialize)]
struct NewRoute<'a> {
    user_id: Uuid,
    node_id: i64,
    route: &'a str,
    enabled: bool,
}

/// RoutesPage
///
/// Subnet routes plus the nodes they can be attached to.
#[derive(Debug, Clone, Default)]
pub struct RoutesPage {
    routes: Vec<Route>,
    nodes: Vec<Node>,
}

impl RoutesPage {
    pub async fn load(data: &dyn DataService) -> Result<Self> {
        let (routes, nodes) = tokio::try_join!(
            fetch_all(data, Table::Routes, Query::new().newest_first()),
            fetch_all(data, Table::Nodes, Query::new()),
        )?;
        Ok(Self { routes, nodes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_name(&self, node_id: i64) -> &str {
        self.nodes
            .iter()
            .find(|node| node.id == node_id)
            .map_or(UNKNOWN_NODE, |node| node.node_name.as_str())
    }

    pub fn views(&self) -> Vec<RouteView> {
        self.routes
            .iter()
            .map(|route| RouteView {
                route: route.clone(),
                node_name: self.node_name(route.node_id).to_string(),
            })
            .collect()
    }

    /// add
    ///
    /// Adds a route owned by `owner`. The prefix must be a valid CIDR and the node
    /// one of the loaded nodes. New routes start disabled.
    pub async fn add(
        &mut self,
        data: &dyn DataService,
        owner: Uuid,
        request: &NewRouteRequest,
    ) -> Result<()> {
        let prefix = request.route.trim();
        if parse_prefix(prefix).is_none() {
            return Err(AppError::Validation(format!(
                "Invalid route prefix: {prefix:?} (expected CIDR notation, e.g. 10.0.0.0/24)"
            )));
        }
        if !self.nodes.iter().any(|node| node.id == request.node_id) {
            return Err(AppError::Validation(format!(
                "Unknown node: {}",
                request.node_id
            )));
        }

        let row = NewRoute {
            user_id: owner,
            node_id: request.node_id,
            route: prefix,
            enabled: false,
        };
        let created: Route = insert_row(data, Table::Routes, &row).await?;

        match Self::load(data).await {
            Ok(page) => *self = page,
            Err(e) => {
                tracing::warn!(
                    route_id = created.id,
                    error = %e,
                    "route added but the list could not be reloaded"
                );
                self.routes.insert(0, created);
            }
        }
        Ok(())
    }

    /// Flips `enabled` on the route and returns the new value.
    pub async fn toggle(&mut self, data: &dyn DataService, id: i64) -> Result<bool> {
        let current = self
            .routes
            .iter()
            .find(|route| route.id == id)
            .ok_or_else(|| AppError::NotFound(format!("route {id}")))?;

        let enabled = !current.enabled;
        let _: Route = update_row(data, Table::Routes, id.into(), &json!({ "enabled": enabled }))
            .await?;

        if let Some(route) = self.routes.iter_mut().find(|route| route.id == id) {
            route.enabled = enabled;
        }
        Ok(enabled)
    }

    pub async fn delete(&mut self, data: &dyn DataService, id: i64) -> Result<()> {
        data.delete(Table::Routes, id.into()).await?;
        self.routes.retain(|route| route.id != id);
        Ok(())
    }
}
