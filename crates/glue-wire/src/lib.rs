//! # glue-wire
//!
//! Wire types for the xDS State-of-the-World discovery protocol.
//!
//! The messages here carry Envoy's v3 field numbering, so they are
//! byte-compatible with `envoy.service.discovery.v3` on the wire without
//! pulling the full data-plane-api proto tree into the build. Only the
//! fields this control plane reads or writes are modelled; unknown fields
//! sent by clients are skipped by prost during decode.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

// Re-export prost types for convenience
pub use prost::Message;
pub use prost_types::Any;

pub mod envoy {
    //! Envoy xDS types.

    pub mod service {
        //! Envoy discovery service definitions.

        pub mod discovery {
            //! Core discovery service types.

            pub mod v3 {
                //! Discovery service v3 API.

                use crate::envoy::config::core::v3::{ControlPlane, Node};

                /// Discovery request sent by clients.
                ///
                /// A request with an empty `response_nonce` is the initial
                /// subscription; a request echoing a previously sent nonce is
                /// an ACK (no `error_detail`) or a NACK (`error_detail` set).
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DiscoveryRequest {
                    /// Version the client currently has applied (informational).
                    #[prost(string, tag = "1")]
                    pub version_info: String,
                    /// Identity of the requesting node; latched from the first
                    /// request on a stream.
                    #[prost(message, optional, tag = "2")]
                    pub node: Option<Node>,
                    /// Subscribed resource names; empty means wildcard.
                    #[prost(string, repeated, tag = "3")]
                    pub resource_names: Vec<String>,
                    /// Type URL of the requested resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Nonce of the response being acknowledged; empty on the
                    /// initial request.
                    #[prost(string, tag = "5")]
                    pub response_nonce: String,
                    /// Present when the client rejects the acknowledged
                    /// response.
                    #[prost(message, optional, tag = "6")]
                    pub error_detail: Option<crate::google::rpc::Status>,
                }

                /// Discovery response sent by servers.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DiscoveryResponse {
                    /// Version of this response.
                    #[prost(string, tag = "1")]
                    pub version_info: String,
                    /// The full set of subscribed resources, Any-wrapped.
                    #[prost(message, repeated, tag = "2")]
                    pub resources: Vec<prost_types::Any>,
                    /// Whether this is a canary response.
                    #[prost(bool, tag = "3")]
                    pub canary: bool,
                    /// Type URL of the resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Unique nonce for this response, echoed on ack/nack.
                    #[prost(string, tag = "5")]
                    pub nonce: String,
                    /// Control plane identifier.
                    #[prost(message, optional, tag = "6")]
                    pub control_plane: Option<ControlPlane>,
                }

                impl DiscoveryResponse {
                    /// Validate the response before it leaves the server.
                    ///
                    /// Checks the structural fields every conformant SotW
                    /// response must carry. Returns a description of the first
                    /// violation found.
                    pub fn validate(&self) -> Result<(), String> {
                        if self.version_info.is_empty() {
                            return Err("version_info is empty".to_string());
                        }
                        if self.type_url.is_empty() {
                            return Err("type_url is empty".to_string());
                        }
                        if self.nonce.is_empty() {
                            return Err("nonce is empty".to_string());
                        }
                        for (i, any) in self.resources.iter().enumerate() {
                            if any.type_url.is_empty() {
                                return Err(format!("resource {} has an empty type_url", i));
                            }
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    pub mod config {
        //! Envoy configuration types.

        pub mod core {
            //! Core configuration types.

            pub mod v3 {
                //! Core v3 API.

                /// Node information identifying an xDS client.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Node {
                    /// Opaque node identifier.
                    #[prost(string, tag = "1")]
                    pub id: String,
                    /// Cluster the node belongs to.
                    #[prost(string, tag = "2")]
                    pub cluster: String,
                    /// User agent name, e.g. "envoy".
                    #[prost(string, tag = "6")]
                    pub user_agent_name: String,
                    /// Locality of the node.
                    #[prost(message, optional, tag = "9")]
                    pub locality: Option<Locality>,
                }

                /// Locality information.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Locality {
                    /// Region.
                    #[prost(string, tag = "1")]
                    pub region: String,
                    /// Zone.
                    #[prost(string, tag = "2")]
                    pub zone: String,
                    /// Sub-zone.
                    #[prost(string, tag = "3")]
                    pub sub_zone: String,
                }

                /// Control plane identifier attached to responses.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ControlPlane {
                    /// Identifier for this control plane instance.
                    #[prost(string, tag = "1")]
                    pub identifier: String,
                }
            }
        }
    }
}

pub mod google {
    //! Google API types.

    pub mod rpc {
        //! gRPC status types.

        /// Status carried in `DiscoveryRequest.error_detail` on NACK.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Status {
            /// Status code (google.rpc.Code).
            #[prost(int32, tag = "1")]
            pub code: i32,
            /// Developer-facing error message.
            #[prost(string, tag = "2")]
            pub message: String,
            /// Additional error details.
            #[prost(message, repeated, tag = "3")]
            pub details: Vec<prost_types::Any>,
        }
    }
}
