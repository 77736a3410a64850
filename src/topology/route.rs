use serde::{Deserialize, Serialize};

/// A publish destination or a queue binding: an exchange plus a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub exchange: String,
    pub routing_key: String,
}

impl Route {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Route through the default exchange, which delivers straight to the
    /// queue named by the routing key.
    pub fn to_queue(queue: impl Into<String>) -> Self {
        Self::new("", queue)
    }
}

/// Queues and bindings parsed from a list of specification tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specification {
    pub queues: Vec<String>,
    pub bindings: Vec<Route>,
}

impl Specification {
    /// Parses every token, keeping queues and bindings in input order.
    pub fn parse<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::default();
        for token in tokens {
            spec.push(token.as_ref());
        }
        spec
    }

    fn push(&mut self, token: &str) {
        let mut segments = token.split('/');
        let exchange = segments.next().unwrap_or_default();
        let routes: Vec<Route> = segments.map(|key| Route::new(exchange, key)).collect();

        if routes.is_empty() {
            self.queues.push(token.to_string());
        } else {
            self.bindings.extend(routes);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty() && self.bindings.is_empty()
    }

    /// Every destination as a publish route. Queue names go through the
    /// default exchange.
    pub fn routes(&self) -> Vec<Route> {
        self.queues
            .iter()
            .map(Route::to_queue)
            .chain(self.bindings.iter().cloned())
            .collect()
    }
}
