//! Hyperadmin – the administrative core of a schema-typed issue tracker store.
//!
//! A tracker store holds *classes* (`issue`, `user`, `status`, ...) whose
//! instances carry typed properties. Some properties are relational: a
//! `Link` references one instance of another class and a `Multilink` a set
//! of them. This crate sits between free-form text and such a store:
//! * command-line values are decoded into typed values, with references
//!   given either as identifiers or as the target class's key value,
//! * dotted paths such as `assignedto.roles` are walked across classes so
//!   instances can be filtered by the attributes of related instances,
//! * whole classes, their journals and attachments are exported to and
//!   imported from delimiter-separated files without losing identifiers,
//!   retirement state or history.
//!
//! ## Modules
//! * [`schema`] – Property kinds, class specifications and the schema.
//! * [`datatype`] – Typed values: decimals, dates, intervals, credentials.
//! * [`codec`] – Text to value decoding and the export field encoding.
//! * [`path`] – Designators (`issue12`), transitive paths and filter terms.
//! * [`command`] – Abbreviation-tolerant command lookup.
//! * [`rows`] – The delimiter-separated row dialect.
//! * [`store`] – The storage-engine contract, with [`memory`] implementing it.
//! * [`roundtrip`] – Bulk export and import.
//! * [`session`] and [`admin`] – The administrative operations.
//! * [`settings`] – Configuration through the `config` crate.
//! * [`cli`] – One command against a directory-backed store.
//!
//! ## Quick Start
//! ```
//! use hyperadmin::admin::command_table;
//! use hyperadmin::memory::MemoryStore;
//! use hyperadmin::schema::{ClassSpec, PropertyKind, Schema};
//! use hyperadmin::session::Session;
//! use hyperadmin::settings::Settings;
//!
//! let schema = Schema::from_classes(vec![
//!     ClassSpec::new("user").property("username", PropertyKind::String).key("username"),
//!     ClassSpec::new("issue")
//!         .property("title", PropertyKind::String)
//!         .property("assignedto", PropertyKind::Link("user".to_string())),
//! ]).unwrap();
//! let mut session = Session::new(Box::new(MemoryStore::new(schema, "admin")), Settings::default());
//! let commands = command_table();
//! let run = |session: &mut Session, line: &[&str]| {
//!     let line: Vec<String> = line.iter().map(|s| s.to_string()).collect();
//!     session.execute(&commands, &line).unwrap()
//! };
//! run(&mut session, &["create", "user", "username=alice"]);
//! run(&mut session, &["cr", "issue", "title=Crash", "assignedto=alice"]);
//! assert_eq!(run(&mut session, &["get", "assignedto", "issue1"]), vec!["1"]);
//! ```

pub mod admin;
pub mod cli;
pub mod codec;
pub mod command;
pub mod datatype;
pub mod error;
pub mod memory;
pub mod path;
pub mod roundtrip;
pub mod rows;
pub mod schema;
pub mod session;
pub mod settings;
pub mod store;
