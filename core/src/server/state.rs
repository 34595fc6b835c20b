//! Server state machine shared by all codec-backed server layers

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};

use log::*;
use serde_json::Value;

use super::{Credential, Handler, Incoming, InvalidParams, ServerLayer};
use crate::codec::{Call, Codec};
use crate::error::{Rejected, ServerError};
use crate::options::LayerOptions;

/// Server layer over any [`Codec`].
///
/// Holds the method bindings, the admission policies, the standing options and the last
/// decoded request.
pub struct Server<C> {
    codec: C,
    bindings: HashMap<String, Handler>,
    users: HashSet<Credential>,
    allowed_hosts: HashSet<IpAddr>,
    options: LayerOptions,
    request: Option<Call>,
}

impl<C: Codec> Server<C> {
    pub fn new(codec: C, options: LayerOptions) -> Self {
        Self {
            codec,
            bindings: HashMap::new(),
            users: HashSet::new(),
            allowed_hosts: HashSet::new(),
            options,
            request: None,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Standing options
    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn is_bound(&self, method: &str) -> bool {
        self.bindings.contains_key(method)
    }

    pub fn bound_methods(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// False while the credential set is empty
    pub fn requires_authentication(&self) -> bool {
        !self.users.is_empty()
    }

    /// False while the allow-list is empty
    pub fn is_restricted(&self) -> bool {
        !self.allowed_hosts.is_empty()
    }

    fn check_host(&self, incoming: &Incoming) -> Result<(), ServerError> {
        if !self.is_restricted() {
            return Ok(());
        }
        match incoming.host {
            Some(host) if self.allowed_hosts.contains(&host) => Ok(()),
            host => Err(ServerError::Forbidden { host }),
        }
    }

    fn check_credentials(&self, incoming: &Incoming) -> Result<(), ServerError> {
        if !self.requires_authentication() {
            return Ok(());
        }
        match &incoming.credentials {
            Some(c) if self.users.contains(c) => Ok(()),
            presented => Err(ServerError::Unauthorized {
                login: presented.as_ref().map(|c| c.login.clone()),
            }),
        }
    }

    fn reject(&self, id: Option<&Value>, error: ServerError, options: &LayerOptions) -> Rejected {
        let response = self.codec.encode_error(id, &error, options);
        Rejected { error, response }
    }
}

/// Runs a handler, turning both errors and panics into a [`ServerError`]
fn invoke(handler: &Handler, params: &Value) -> Result<Value, ServerError> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => match e.downcast_ref::<InvalidParams>() {
            Some(InvalidParams(msg)) => Err(ServerError::InvalidParams(msg.clone())),
            None => Err(ServerError::HandlerFailure(format!("{:#}", e))),
        },
        Err(payload) => Err(ServerError::HandlerFailure(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

impl<C: Codec> ServerLayer for Server<C> {
    fn bind(&mut self, method: &str, handler: Handler) {
        if self.bindings.insert(method.to_string(), handler).is_some() {
            debug!("Rebound method {}", method);
        }
    }

    fn authenticate_users(&mut self, users: Vec<Credential>) {
        self.users = users.into_iter().collect();
        if self.users.is_empty() {
            info!("Authentication disabled");
        } else {
            info!("Authentication enabled for {} credential(s)", self.users.len());
        }
    }

    fn restrict_by_ips(&mut self, hosts: Vec<IpAddr>) {
        self.allowed_hosts = hosts.into_iter().collect();
        if self.allowed_hosts.is_empty() {
            info!("IP restriction disabled");
        } else {
            info!("IP restriction enabled for {} host(s)", self.allowed_hosts.len());
        }
    }

    fn execute(
        &mut self,
        incoming: &Incoming,
        options: LayerOptions,
        reset_options: bool,
    ) -> Result<String, Rejected> {
        let effective = if reset_options {
            options.clone()
        } else {
            self.options.merged(&options)
        };

        if let Err(error) = self
            .check_host(incoming)
            .and_then(|()| self.check_credentials(incoming))
        {
            warn!("Rejected request: {}", error);
            return Err(self.reject(None, error, &effective));
        }

        // Only admitted requests may replace the standing options
        if reset_options {
            self.options = options;
        }

        let call = match self.codec.decode_call(&incoming.body, &effective) {
            Ok(call) => call,
            Err(error) => {
                debug!("Failed to decode {} request: {}", self.codec.name(), error);
                return Err(self.reject(None, error, &effective));
            }
        };

        let handler = self.bindings.get(&call.method).cloned();
        let Some(handler) = handler else {
            debug!("Method not found: {}", call.method);
            let error = ServerError::MethodNotFound(call.method.clone());
            let rejected = self.reject(call.id.as_ref(), error, &effective);
            self.request = Some(call);
            return Err(rejected);
        };

        trace!("Dispatching {}", call.method);
        let response = match invoke(&handler, &call.params) {
            Ok(result) => self.codec.encode_result(call.id.as_ref(), result, &effective),
            Err(error) => {
                warn!("Method {} failed: {}", call.method, error);
                self.codec.encode_error(call.id.as_ref(), &error, &effective)
            }
        };
        self.request = Some(call);
        Ok(response)
    }

    fn get_request(&self) -> Option<&Call> {
        self.request.as_ref()
    }
}
