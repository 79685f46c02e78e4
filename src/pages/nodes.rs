use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    data_service::{DataService, Query, Table, fetch_all},
    error::Result,
    format::{NodeStatus, matches_search, node_status},
    models::Node,
};

#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct NodeView {
    pub node: Node,
    pub status: NodeStatus,
}

/// NodesPage
///
/// The nodes registered by the signed-in identity (all nodes for admins).
#[derive(Debug, Clone, Default)]
pub struct NodesPage {
    nodes: Vec<Node>,
}

impl NodesPage {
    pub async fn load(data: &dyn DataService) -> Result<Self> {
        let nodes = fetch_all(data, Table::Nodes, Query::new().newest_first()).await?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Nodes whose name or IP address contains `term`, each with its status as of `now`.
    pub fn search(&self, term: &str, now: DateTime<Utc>) -> Vec<NodeView> {
        self.nodes
            .iter()
            .filter(|node| {
                matches_search(&node.node_name, term)
                    || node
                        .ip_address
                        .as_deref()
                        .is_some_and(|ip| matches_search(ip, term))
            })
            .map(|node| NodeView {
                node: node.clone(),
                status: node_status(node.last_seen, now),
            })
            .collect()
    }

    pub async fn delete(&mut self, data: &dyn DataService, id: i64) -> Result<()> {
        data.delete(Table::Nodes, id.into()).await?;
        self.nodes.retain(|node| node.id != id);
        Ok(())
    }
}
