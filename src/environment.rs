// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//log
pub const ENV_BYTECACHE_LOG: &str = "BYTECACHE_LOG";

//cross runtime
pub const ENV_BYTECACHE_RUNTIME: &str = "BYTECACHE_RUNTIME";
pub const ENV_BYTECACHE_RUN_AS_HOST: &str = "BYTECACHE_RUN_AS_HOST";

//engine
pub const ENV_BYTECACHE_GC_THRESHOLD_MB: &str = "BYTECACHE_GC_THRESHOLD_MB";
pub const ENV_BYTECACHE_MAX_STACK_SIZE_KB: &str = "BYTECACHE_MAX_STACK_SIZE_KB";
pub const ENV_BYTECACHE_MEMORY_LIMIT_MB: &str = "BYTECACHE_MEMORY_LIMIT_MB";
