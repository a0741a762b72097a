// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::result::Result as StdResult;

use rquickjs::{Ctx, Exception, Result};

use crate::error::Error;

/// Turns host failures into pending JS exceptions.
pub trait ResultExt<T> {
    fn or_throw(self, ctx: &Ctx) -> Result<T>;
    fn or_throw_type(self, ctx: &Ctx, msg: &str) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for StdResult<T, E> {
    fn or_throw(self, ctx: &Ctx) -> Result<T> {
        self.map_err(|err| err.into().throw(ctx))
    }

    fn or_throw_type(self, ctx: &Ctx, msg: &str) -> Result<T> {
        self.map_err(|err| {
            let err = err.into();
            if msg.is_empty() {
                Exception::throw_type(ctx, &err.to_string())
            } else {
                Exception::throw_type(ctx, &[msg, ". ", &err.to_string()].concat())
            }
        })
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn or_throw(self, ctx: &Ctx) -> Result<T> {
        self.ok_or_else(|| Exception::throw_message(ctx, "Value is not present"))
    }

    fn or_throw_type(self, ctx: &Ctx, msg: &str) -> Result<T> {
        self.ok_or_else(|| Exception::throw_type(ctx, msg))
    }
}
