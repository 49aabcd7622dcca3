//! Built-in manifest for the `remilias.eth` naming system.
//!
//! Brings up the base registry, the `remilias.eth` registrar with its
//! controller and name wrapper, two resolvers with their interface
//! bindings, the registrar's admission collections, and a multicall
//! utility. Every task is idempotent, so the manifest can be re-run against
//! a partially or fully provisioned ledger.

use crate::domain::{
    ActionTemplate, Address, Condition, Guard, Manifest, Operand, ReadCall, Role, TaskDecl,
};

pub const REGISTRY: &str = "ENSRegistry";
pub const REVERSE_REGISTRAR: &str = "ReverseRegistrar";
pub const METADATA: &str = "StaticMetadataService";
pub const REGISTRAR: &str = "RemiliasRegistrar";
pub const WRAPPER: &str = "RemiliasNameWrapper";
pub const CONTROLLER: &str = "RemiliasRegistrarController";
pub const RESOLVER: &str = "RemiliasResolver";
pub const PUBLIC_RESOLVER: &str = "RemiliasPublicResolver";
pub const MULTICALL: &str = "Multicall3";

pub const ROOT_NAME: &str = "remilias.eth";
pub const RESOLVER_NAME: &str = "resolver.remilias.eth";

const REGISTRAR_INTERFACE: &[&str] = &[
    "addController(address)",
    "removeController(address)",
    "available(uint256)",
    "registerResolver()",
];

const CONTROLLER_INTERFACE: &[&str] = &[
    "register(string,address,address,uint256,address,bytes[])",
    "resetOwner(address,uint256)",
    "addCollection(address)",
    "nftContracts(address)",
];

const WRAPPER_INTERFACE: &[&str] = &[
    "wrapRemilias2LD(string,address,uint16,address)",
    "unwrapRemilias2LD(bytes32,address,address)",
    "setController(address,bool)",
];

/// Collections whose holders may register names, keyed by a short label
/// used in task ids.
pub const COLLECTIONS: &[(&str, Address)] = &[
    ("bonkler", Address::from_literal("0xabfae8a54e6817f57f9de7796044e9a60e61ad67")),
    ("milady", Address::from_literal("0x5af0d9827e0c53e4799bb226655a1de152a425a5")),
    ("milady333", Address::from_literal("0x8a45fb65311ac8434aad5b8a93d1eba6ac4e813b")),
    ("remilio", Address::from_literal("0xd3d9ddd0cf0a5f0bfb8f7fceae075df687eaebab")),
    ("yayo", Address::from_literal("0x09f66a094a0070ebddefa192a33fa5d75b59d46b")),
    ("pixelady", Address::from_literal("0x8fc0d90f2c45a5e7f94904075c952e0943cfccfd")),
];

fn dep(name: &str) -> Operand {
    Operand::deployment(name)
}

fn account(role: Role) -> Operand {
    Operand::Account(role)
}

fn read(target: &str, query: &str, args: Vec<Operand>) -> ReadCall {
    ReadCall::new(dep(target), query, args)
}

fn deploy(id: &str, contract: &str, args: Vec<Operand>) -> TaskDecl {
    TaskDecl::new(
        id,
        format!("deploy {contract}"),
        Guard::satisfied_when(Condition::deployed_with(contract, args.clone())),
        ActionTemplate::deploy(contract, args),
    )
}

fn transfer_ownership(id: &str, contract: &str) -> TaskDecl {
    TaskDecl::new(
        id,
        format!("hand {contract} ownership to owner"),
        Guard::satisfied_when(Condition::equals(
            read(contract, "owner", vec![]),
            account(Role::owner()),
        )),
        ActionTemplate::call(dep(contract), "transferOwnership", vec![account(Role::owner())]),
    )
}

fn controller_flag(id: &str, on: &str, controller: Operand, selector: &str) -> TaskDecl {
    let args = if selector == "setController" {
        vec![controller.clone(), Operand::Bool(true)]
    } else {
        vec![controller.clone()]
    };
    TaskDecl::new(
        id,
        format!("grant controller rights on {on}"),
        Guard::satisfied_when(Condition::equals(
            read(on, "controllers", vec![controller]),
            Operand::Bool(true),
        )),
        ActionTemplate::call(dep(on), selector, args),
    )
}

fn set_interface(id: &str, resolver: &str, interface: &[&str], implementer: &str) -> TaskDecl {
    let iface = Operand::Interface(interface.iter().map(|s| s.to_string()).collect());
    TaskDecl::new(
        id,
        format!("bind {implementer} interface on {resolver}"),
        Guard::satisfied_when(Condition::equals(
            read(
                resolver,
                "interfaceImplementer",
                vec![Operand::node(ROOT_NAME), iface.clone()],
            ),
            dep(implementer),
        )),
        ActionTemplate::call(
            dep(resolver),
            "setInterface",
            vec![Operand::node(ROOT_NAME), iface, dep(implementer)],
        ),
    )
}

fn node_owner(name: &str) -> ReadCall {
    read(REGISTRY, "owner", vec![Operand::node(name)])
}

fn node_resolver(name: &str) -> ReadCall {
    read(REGISTRY, "resolver", vec![Operand::node(name)])
}

fn registry_tasks() -> Vec<TaskDecl> {
    vec![
        deploy("registry.deploy", REGISTRY, vec![]).tagged(&["registry"]),
        TaskDecl::new(
            "registry.claim-eth",
            "assign the eth node to owner",
            Guard::satisfied_when(
                Condition::equals(node_owner("eth"), Operand::Zero).negate(),
            ),
            ActionTemplate::call(
                dep(REGISTRY),
                "setSubnodeOwner",
                vec![Operand::node(""), Operand::label("eth"), account(Role::owner())],
            ),
        )
        .after(&["registry.deploy"])
        .tagged(&["registry"]),
        TaskDecl::new(
            "registry.claim-remilias",
            "assign the remilias.eth node to owner",
            Guard::satisfied_when(
                Condition::equals(node_owner(ROOT_NAME), Operand::Zero).negate(),
            ),
            ActionTemplate::call(
                dep(REGISTRY),
                "setSubnodeOwner",
                vec![
                    Operand::node("eth"),
                    Operand::label("remilias"),
                    account(Role::owner()),
                ],
            ),
        )
        .after(&["registry.claim-eth"])
        .signed_by(Role::owner())
        .tagged(&["registry"]),
        deploy("reverse-registrar.deploy", REVERSE_REGISTRAR, vec![dep(REGISTRY)])
            .after(&["registry.deploy"])
            .tagged(&["registry"]),
        deploy("metadata.deploy", METADATA, vec![]).tagged(&["wrapper"]),
    ]
}

fn registrar_tasks() -> Vec<TaskDecl> {
    vec![
        deploy(
            "registrar.deploy",
            REGISTRAR,
            vec![dep(REGISTRY), Operand::node(ROOT_NAME)],
        )
        .after(&["registry.deploy"])
        .tagged(&["remiliasregistrar"]),
        controller_flag(
            "registrar.owner-controller",
            REGISTRAR,
            account(Role::owner()),
            "addController",
        )
        .after(&["registrar.deploy"])
        .tagged(&["remiliasregistrar"]),
        transfer_ownership("registrar.transfer-ownership", REGISTRAR)
            .after(&["registrar.owner-controller"])
            .tagged(&["remiliasregistrar"]),
    ]
}

fn wrapper_tasks() -> Vec<TaskDecl> {
    vec![
        deploy(
            "wrapper.deploy",
            WRAPPER,
            vec![dep(REGISTRY), dep(REGISTRAR), dep(METADATA)],
        )
        .after(&["registrar.deploy", "metadata.deploy"])
        .signed_by(Role::owner())
        .tagged(&["wrapper"]),
        controller_flag(
            "registrar.wrapper-controller",
            REGISTRAR,
            dep(WRAPPER),
            "addController",
        )
        .after(&["wrapper.deploy", "registrar.transfer-ownership"])
        .signed_by(Role::owner())
        .tagged(&["wrapper"]),
        transfer_ownership("wrapper.transfer-ownership", WRAPPER)
            .after(&["wrapper.deploy"])
            .signed_by(Role::owner())
            .tagged(&["wrapper"]),
    ]
}

fn controller_tasks() -> Vec<TaskDecl> {
    vec![
        deploy(
            "controller.deploy",
            CONTROLLER,
            vec![
                dep(REGISTRAR),
                dep(REVERSE_REGISTRAR),
                dep(WRAPPER),
                dep(REGISTRY),
            ],
        )
        .after(&["registrar.deploy", "wrapper.deploy", "reverse-registrar.deploy"])
        .tagged(&["remiliasregistrar"]),
        transfer_ownership("controller.transfer-ownership", CONTROLLER)
            .after(&["controller.deploy"])
            .tagged(&["remiliasregistrar"]),
        controller_flag(
            "registrar.controller-controller",
            REGISTRAR,
            dep(CONTROLLER),
            "addController",
        )
        .after(&["controller.deploy", "registrar.transfer-ownership"])
        .signed_by(Role::owner())
        .tagged(&["remiliasregistrar"]),
        controller_flag(
            "wrapper.controller-controller",
            WRAPPER,
            dep(CONTROLLER),
            "setController",
        )
        .after(&["controller.deploy", "wrapper.transfer-ownership"])
        .signed_by(Role::owner())
        .tagged(&["wrapper"]),
    ]
}

fn resolver_tasks() -> Vec<TaskDecl> {
    let owned_by_registrar = Condition::equals(node_owner(ROOT_NAME), dep(REGISTRAR));
    let resolved_by_resolver = Condition::equals(node_resolver(ROOT_NAME), dep(RESOLVER));

    vec![
        deploy("resolver.deploy", RESOLVER, vec![])
            .after(&["registrar.deploy", "controller.deploy", "wrapper.deploy"])
            .tagged(&["resolvers"]),
        set_interface("resolver.interface.registrar", RESOLVER, REGISTRAR_INTERFACE, REGISTRAR)
            .after(&["resolver.deploy"])
            .tagged(&["resolvers"]),
        set_interface(
            "resolver.interface.controller",
            RESOLVER,
            CONTROLLER_INTERFACE,
            CONTROLLER,
        )
        .after(&["resolver.deploy"])
        .tagged(&["resolvers"]),
        set_interface("resolver.interface.wrapper", RESOLVER, WRAPPER_INTERFACE, WRAPPER)
            .after(&["resolver.deploy"])
            .tagged(&["resolvers"]),
        TaskDecl::new(
            "registry.set-remilias-resolver",
            "point remilias.eth at RemiliasResolver",
            Guard::satisfied_when(resolved_by_resolver.clone()).applies_when(
                Condition::equals(node_owner(ROOT_NAME), account(Role::owner())),
            ),
            ActionTemplate::call(
                dep(REGISTRY),
                "setResolver",
                vec![Operand::node(ROOT_NAME), dep(RESOLVER)],
            ),
        )
        .after(&["resolver.deploy", "registry.claim-remilias"])
        .signed_by(Role::owner())
        .tagged(&["resolvers"]),
        TaskDecl::new(
            "registry.hand-remilias-to-registrar",
            "transfer remilias.eth to the registrar",
            Guard::satisfied_when(owned_by_registrar.clone())
                .applies_when(resolved_by_resolver.clone()),
            ActionTemplate::call(
                dep(REGISTRY),
                "setOwner",
                vec![Operand::node(ROOT_NAME), dep(REGISTRAR)],
            ),
        )
        .after(&["registry.set-remilias-resolver", "registrar.deploy"])
        .signed_by(Role::owner())
        .tagged(&["resolvers"]),
        TaskDecl::new(
            "resolver.set-addr",
            "resolve remilias.eth to the registrar",
            Guard::satisfied_when(Condition::equals(
                read(RESOLVER, "addr", vec![Operand::node(ROOT_NAME)]),
                dep(REGISTRAR),
            ))
            .applies_when(Condition::All(vec![owned_by_registrar, resolved_by_resolver])),
            ActionTemplate::call(
                dep(RESOLVER),
                "setAddr",
                vec![Operand::node(ROOT_NAME), dep(REGISTRAR)],
            ),
        )
        .after(&["registry.hand-remilias-to-registrar"])
        .tagged(&["resolvers"]),
        transfer_ownership("resolver.transfer-ownership", RESOLVER)
            .after(&[
                "resolver.interface.registrar",
                "resolver.interface.controller",
                "resolver.interface.wrapper",
                "resolver.set-addr",
            ])
            .tagged(&["resolvers"]),
    ]
}

fn public_resolver_tasks() -> Vec<TaskDecl> {
    vec![
        deploy(
            "public-resolver.deploy",
            PUBLIC_RESOLVER,
            vec![
                dep(REGISTRY),
                dep(WRAPPER),
                dep(CONTROLLER),
                dep(REVERSE_REGISTRAR),
            ],
        )
        .after(&[
            "registrar.deploy",
            "controller.deploy",
            "wrapper.deploy",
            "reverse-registrar.deploy",
        ])
        .tagged(&["resolvers"]),
        set_interface(
            "public-resolver.interface.registrar",
            PUBLIC_RESOLVER,
            REGISTRAR_INTERFACE,
            REGISTRAR,
        )
        .after(&["public-resolver.deploy"])
        .tagged(&["resolvers"]),
        set_interface(
            "public-resolver.interface.controller",
            PUBLIC_RESOLVER,
            CONTROLLER_INTERFACE,
            CONTROLLER,
        )
        .after(&["public-resolver.deploy"])
        .tagged(&["resolvers"]),
        set_interface(
            "public-resolver.interface.wrapper",
            PUBLIC_RESOLVER,
            WRAPPER_INTERFACE,
            WRAPPER,
        )
        .after(&["public-resolver.deploy"])
        .tagged(&["resolvers"]),
        TaskDecl::new(
            "registrar.register-resolver-node",
            "register resolver.remilias.eth through the registrar",
            Guard::satisfied_when(
                Condition::equals(
                    read(REGISTRAR, "available", vec![Operand::label("resolver")]),
                    Operand::Bool(true),
                )
                .negate(),
            )
            .applies_when(Condition::equals(node_owner(ROOT_NAME), dep(REGISTRAR))),
            ActionTemplate::call(dep(REGISTRAR), "registerResolver", vec![]),
        )
        .after(&[
            "public-resolver.deploy",
            "registry.hand-remilias-to-registrar",
            "registrar.transfer-ownership",
        ])
        .signed_by(Role::owner())
        .tagged(&["resolvers"]),
        TaskDecl::new(
            "registry.set-resolver-node-resolver",
            "point resolver.remilias.eth at RemiliasPublicResolver",
            Guard::satisfied_when(Condition::equals(
                node_resolver(RESOLVER_NAME),
                dep(PUBLIC_RESOLVER),
            ))
            .applies_when(Condition::equals(
                node_owner(RESOLVER_NAME),
                account(Role::owner()),
            )),
            ActionTemplate::call(
                dep(REGISTRY),
                "setResolver",
                vec![Operand::node(RESOLVER_NAME), dep(PUBLIC_RESOLVER)],
            ),
        )
        .after(&["registrar.register-resolver-node", "public-resolver.deploy"])
        .signed_by(Role::owner())
        .tagged(&["resolvers"]),
        transfer_ownership("public-resolver.transfer-ownership", PUBLIC_RESOLVER)
            .after(&[
                "public-resolver.interface.registrar",
                "public-resolver.interface.controller",
                "public-resolver.interface.wrapper",
                "registry.set-resolver-node-resolver",
            ])
            .tagged(&["resolvers"]),
    ]
}

fn collection_tasks() -> Vec<TaskDecl> {
    COLLECTIONS
        .iter()
        .map(|&(label, address)| {
            TaskDecl::new(
                format!("init.collection.{label}"),
                format!("admit {label} holders to the controller"),
                Guard::satisfied_when(Condition::equals(
                    read(CONTROLLER, "nftContracts", vec![Operand::Address(address)]),
                    Operand::Bool(true),
                )),
                ActionTemplate::call(
                    dep(CONTROLLER),
                    "addCollection",
                    vec![Operand::Address(address)],
                ),
            )
            .after(&[
                "controller.transfer-ownership",
                "wrapper.deploy",
                "resolver.deploy",
                "public-resolver.deploy",
            ])
            .signed_by(Role::owner())
            .tagged(&["init"])
        })
        .collect()
}

/// The full `remilias.eth` manifest in declaration order.
pub fn remilias() -> Manifest {
    let mut tasks = Vec::new();
    tasks.extend(registry_tasks());
    tasks.extend(registrar_tasks());
    tasks.extend(wrapper_tasks());
    tasks.extend(controller_tasks());
    tasks.extend(resolver_tasks());
    tasks.extend(public_resolver_tasks());
    tasks.extend(collection_tasks());
    tasks.push(deploy("utils.multicall.deploy", MULTICALL, vec![]).tagged(&["utils"]));
    Manifest::new(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use std::collections::HashSet;

    #[test]
    fn every_collection_gets_an_init_task() {
        let manifest = remilias();
        let collections = manifest
            .tasks
            .iter()
            .filter(|t| t.id.as_str().starts_with("init.collection."))
            .count();
        assert_eq!(collections, COLLECTIONS.len());
    }

    #[test]
    fn task_ids_are_unique_and_dependencies_exist() {
        let manifest = remilias();
        let ids: HashSet<&TaskId> = manifest.tasks.iter().map(|t| &t.id).collect();
        assert_eq!(ids.len(), manifest.len());
        for task in &manifest.tasks {
            for d in &task.depends_on {
                assert!(ids.contains(d), "{} depends on unknown {}", task.id, d);
            }
        }
    }

    #[test]
    fn only_deployer_and_owner_sign() {
        let manifest = remilias();
        for task in &manifest.tasks {
            for role in task.roles() {
                assert!(
                    role == Role::deployer() || role == Role::owner(),
                    "{} uses {}",
                    task.id,
                    role
                );
            }
        }
    }
}
