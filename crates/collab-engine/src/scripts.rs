//! Atomic mutation scripts.
//!
//! Every list mutation runs server-side in Redis as one Lua script: mint a
//! new revision from `TIME`, rewrite the `items` map inside the list hash,
//! and publish the change on the updates channel. Redis executes scripts
//! single-threaded, which makes the script the serialization point for L2
//! and gives published events the same total order as the mutations.
//!
//! The revision is seconds plus microseconds; when `TIME` does not advance
//! past the stored revision (same-microsecond mutations, clock hiccups) the
//! script clamps to `stored + 1e-6` so revisions stay strictly increasing
//! per list. Revisions travel as `%.6f` strings to keep full microsecond
//! precision across the wire.
//!
//! `update_item` and `delete_item` return an error reply when the list hash
//! or the target item is missing. Deleted items are kept in the hash as a
//! JSON null (soft-delete marker for existing readers); only the durable
//! store records `is_deleted`.

use redis::aio::ConnectionManager;
use redis::Script;

use crate::Result;

pub const ADD_ITEM: &str = r#"
local list_key = KEYS[1]
local item_id = ARGV[1]
local item_data = ARGV[2]

local time_parts = redis.call('TIME')
local new_rev = tonumber(time_parts[1]) + tonumber(time_parts[2]) / 1000000
local cur_rev = tonumber(redis.call('HGET', list_key, 'rev'))
if cur_rev and new_rev <= cur_rev then
    new_rev = cur_rev + 0.000001
end

local items_json = redis.call('HGET', list_key, 'items')
local items = {}
if items_json then
    items = cjson.decode(items_json)
end

items[item_id] = cjson.decode(item_data)

redis.call('HSET', list_key,
    'rev', string.format('%.6f', new_rev),
    'items', cjson.encode(items),
    'updated_at', time_parts[1]
)

local list_id = string.match(list_key, 'todo:state:(.+)')
local message = cjson.encode({
    type = 'item_added',
    list_id = list_id,
    item = cjson.decode(item_data),
    rev = new_rev
})
redis.call('PUBLISH', 'todo:updates', message)

return string.format('%.6f', new_rev)
"#;

pub const UPDATE_ITEM: &str = r#"
local list_key = KEYS[1]
local item_id = ARGV[1]
local item_data = ARGV[2]

local time_parts = redis.call('TIME')
local new_rev = tonumber(time_parts[1]) + tonumber(time_parts[2]) / 1000000
local cur_rev = tonumber(redis.call('HGET', list_key, 'rev'))
if cur_rev and new_rev <= cur_rev then
    new_rev = cur_rev + 0.000001
end

local items_json = redis.call('HGET', list_key, 'items')
if not items_json then
    return redis.error_reply('List not found')
end

local items = cjson.decode(items_json)
if not items[item_id] or items[item_id] == cjson.null then
    return redis.error_reply('Item not found')
end

items[item_id] = cjson.decode(item_data)

redis.call('HSET', list_key,
    'rev', string.format('%.6f', new_rev),
    'items', cjson.encode(items),
    'updated_at', time_parts[1]
)

local list_id = string.match(list_key, 'todo:state:(.+)')
local message = cjson.encode({
    type = 'item_updated',
    list_id = list_id,
    item = cjson.decode(item_data),
    rev = new_rev
})
redis.call('PUBLISH', 'todo:updates', message)

return string.format('%.6f', new_rev)
"#;

pub const DELETE_ITEM: &str = r#"
local list_key = KEYS[1]
local item_id = ARGV[1]

local time_parts = redis.call('TIME')
local new_rev = tonumber(time_parts[1]) + tonumber(time_parts[2]) / 1000000
local cur_rev = tonumber(redis.call('HGET', list_key, 'rev'))
if cur_rev and new_rev <= cur_rev then
    new_rev = cur_rev + 0.000001
end

local items_json = redis.call('HGET', list_key, 'items')
if not items_json then
    return redis.error_reply('List not found')
end

local items = cjson.decode(items_json)
if not items[item_id] or items[item_id] == cjson.null then
    return redis.error_reply('Item not found')
end

-- Hard delete from the hash is deferred to the durable store's soft
-- delete; the map keeps a null tombstone
items[item_id] = cjson.null

redis.call('HSET', list_key,
    'rev', string.format('%.6f', new_rev),
    'items', cjson.encode(items),
    'updated_at', time_parts[1]
)

local list_id = string.match(list_key, 'todo:state:(.+)')
local message = cjson.encode({
    type = 'item_deleted',
    list_id = list_id,
    item_id = item_id,
    rev = new_rev
})
redis.call('PUBLISH', 'todo:updates', message)

return string.format('%.6f', new_rev)
"#;

/// The three mutation scripts, hashed once at construction and invoked by
/// SHA thereafter.
pub struct ScriptSet {
    pub add_item: Script,
    pub update_item: Script,
    pub delete_item: Script,
}

impl Default for ScriptSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptSet {
    pub fn new() -> Self {
        Self {
            add_item: Script::new(ADD_ITEM),
            update_item: Script::new(UPDATE_ITEM),
            delete_item: Script::new(DELETE_ITEM),
        }
    }

    /// Preload the scripts into the Redis script cache so the first
    /// mutation does not pay the EVAL round trip.
    pub async fn register(&self, conn: &mut ConnectionManager) -> Result<()> {
        for source in [ADD_ITEM, UPDATE_ITEM, DELETE_ITEM] {
            redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(source)
                .query_async::<String>(conn)
                .await?;
        }
        Ok(())
    }
}
