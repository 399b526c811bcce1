diesel::table! {
    kv_entries (collection, entry_key) {
        collection -> Text,
        entry_key -> Text,
        value -> Text,
        expires_at -> Nullable<Text>,
        updated_at -> Text,
    }
}
