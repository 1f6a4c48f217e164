//! Checked-in diesel schema for the tables backing the secret store's
//! persisted state. Migration mechanics are out of scope here; only the
//! resulting tables are named, matching the teacher's convention of
//! committing `schema.rs` alongside its migrations rather than
//! regenerating it at build time.

diesel::table! {
    secrets (id_hash) {
        id_hash -> Bytea,
        secret -> Bytea,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    onion_keys (id) {
        id -> SmallInt,
        private_key -> Bytea,
    }
}

diesel::table! {
    lnc_sessions (passphrase_entropy) {
        passphrase_entropy -> Bytea,
        session_data -> Bytea,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(secrets, onion_keys, lnc_sessions,);
