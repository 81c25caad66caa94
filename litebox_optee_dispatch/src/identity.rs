// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Sanitization of the client identity asserted by the normal world

use litebox_common_optee::{TeeClientId, TeeIdentity, TeeLogin, TeeResult, TeeUuid};

/// Turn the identity a normal-world client claims into the identity a TA gets to see.
///
/// Anonymous (`Public`) and `Kernel` clients carry no meaningful identifier, so theirs is
/// replaced by the nil UUID no matter what the caller sent. User, group, and application
/// logins keep the identifier as given. Everything else, including `TrustedApp`, cannot come
/// from the normal world and is refused.
pub fn sanitize_client_identity(client: &TeeClientId) -> Result<TeeIdentity, TeeResult> {
    let login = TeeLogin::try_from(client.login).map_err(|_| TeeResult::BadParameters)?;
    let uuid = match login {
        TeeLogin::Public | TeeLogin::Kernel => TeeUuid::NIL,
        TeeLogin::User
        | TeeLogin::Group
        | TeeLogin::Application
        | TeeLogin::ApplicationUser
        | TeeLogin::ApplicationGroup => client.uuid,
        TeeLogin::TrustedApp => return Err(TeeResult::BadParameters),
    };
    Ok(TeeIdentity { login, uuid })
}
