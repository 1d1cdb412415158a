use ethers::prelude::*;

abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
        event Transfer(address indexed from, address indexed to, uint256 value)
    ]"#
);
