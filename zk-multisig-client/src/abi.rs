//! Solidity ABI surface of the contracts the client talks to.

use alloy_sol_types::sol;

sol! {
    /// Factory that instantiates two-owner multisig accounts with `create2`.
    interface IAAFactory {
        function aaBytecodeHash() external view returns (bytes32 hash);
        function deployAccount(bytes32 salt, address owner1, address owner2) external returns (address accountAddress);
    }

    /// System contract through which every deployment on the network goes.
    interface IContractDeployer {
        event ContractDeployed(address indexed deployerAddress, bytes32 indexed bytecodeHash, address indexed contractAddress);

        function create(bytes32 salt, bytes32 bytecodeHash, bytes input) external payable returns (address newAddress);
    }
}
