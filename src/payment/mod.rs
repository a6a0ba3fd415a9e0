// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod authorization;
pub mod controller;
pub mod policy;
pub mod state;

pub use authorization::{AuthorizationTerms, PaymentAuthorization, AUTHORIZATION_VALIDITY_SECS};
pub use controller::HandshakeController;
pub use policy::HandshakePolicy;
pub use state::{HandshakeEvent, HandshakeState, Session};
